use super::{GameState, Spinner, Validate};
use std::{collections::HashSet, fmt, iter::FusedIterator, str::FromStr};
use anyhow::{anyhow, Result};
use rand::{rngs::{OsRng, StdRng}, SeedableRng, TryRngCore};
use serde::Serialize;
use thiserror::Error;

pub const WINNING_SCORE: i32 = 10;
pub const MAX_PLAYERS: usize = 4;
// Faces of the spinner, each equally likely. The -2 face is printed twice.
pub const SPINNER_VALUES: [i32; 7] = [1, 2, 3, 4, -2, -2, -10];

// Token colors. There is no "no color" value: a player always holds one of
// these.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Blue, Green, Red, Yellow,
}

pub const COLORS: [Color; 4] = [Color::Blue, Color::Green, Color::Red, Color::Yellow];

impl Color {
    pub fn name(self) -> &'static str {
        match self {
            Color::Blue => "blue",
            Color::Green => "green",
            Color::Red => "red",
            Color::Yellow => "yellow",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Color {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        COLORS
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| anyhow!("unknown color {:?}, expected one of blue, green, red, yellow", s))
    }
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum GameError {
    #[error("invalid player name: {0}")]
    InvalidName(String),

    #[error("only {} players can play at a time", MAX_PLAYERS)]
    RosterFull,

    #[error("color {0} is already taken")]
    ColorUnavailable(Color),

    #[error("no players to remove")]
    RosterEmpty,

    #[error("no player named {0:?}")]
    PlayerNotFound(String),

    #[error("add at least one player before playing")]
    NoPlayers,

    #[error("random source unavailable: {0}")]
    RandomSourceUnavailable(String),
}

impl GameError {
    // Everything but a broken entropy source is a user input problem that the
    // caller can report and move on from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GameError::RandomSourceUnavailable(_))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Player {
    name: String,
    color: Color,
    score: i32,
}

impl Player {
    fn new(name: &str, color: Color) -> Self {
        Self {
            name: name.to_string(),
            color,
            score: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn has_won(&self) -> bool {
        self.score == WINNING_SCORE
    }

    // Copy of the player with `amount` cherries added (or taken away when
    // negative), clamped to [0, WINNING_SCORE].
    fn with_change(&self, amount: i32) -> Self {
        let score = if amount >= 0 {
            std::cmp::min(self.score.saturating_add(amount), WINNING_SCORE)
        } else {
            std::cmp::max(self.score.saturating_add(amount), 0)
        };

        Self { score, ..self.clone() }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// Bounded set of players in seating order. Every operation hands back a new
// roster; a failed operation leaves the receiver as it was.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Roster {
    players: Vec<Player>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    pub fn is_available(&self, color: Color) -> bool {
        self.players.iter().all(|p| p.color != color)
    }

    // Colors nobody holds yet, in palette order
    pub fn available_colors(&self) -> Vec<Color> {
        COLORS.into_iter().filter(|&c| self.is_available(c)).collect()
    }

    pub fn find(&self, name: &str) -> Option<&Player> {
        let name = name.trim();
        self.players.iter().find(|p| p.name == name)
    }

    pub fn add_player(&self, name: &str, color: Color) -> Result<Roster, GameError> {
        if self.is_full() {
            return Err(GameError::RosterFull);
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(GameError::InvalidName("player name cannot be empty".to_string()));
        }
        if !self.is_available(color) {
            return Err(GameError::ColorUnavailable(color));
        }
        if self.find(name).is_some() {
            return Err(GameError::InvalidName(format!("{} is already playing", name)));
        }

        let mut players = self.players.clone();
        players.push(Player::new(name, color));
        Ok(Roster { players })
    }

    pub fn remove_player(&self, name: &str) -> Result<Roster, GameError> {
        if self.players.is_empty() {
            return Err(GameError::RosterEmpty);
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(GameError::InvalidName("player name cannot be empty".to_string()));
        }

        let idx = self.players
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| GameError::PlayerNotFound(name.to_string()))?;

        let mut players = self.players.clone();
        players.remove(idx);
        Ok(Roster { players })
    }

    // Same players, same seating, everyone back at zero cherries.
    pub fn reset_scores(&self) -> Roster {
        Roster {
            players: self.players.iter().map(|p| Player { score: 0, ..p.clone() }).collect(),
        }
    }

    // Lazy game over this roster. The roster itself is left untouched; the
    // sequence works on its own copy of the players.
    pub fn turns<S: Spinner>(&self, spinner: S) -> Result<Turns<S>, GameError> {
        if self.players.is_empty() {
            return Err(GameError::NoPlayers);
        }

        Ok(Turns {
            players: self.players.clone(),
            spinner,
            next: 0,
            round: 0,
            progress: Progress::InProgress,
        })
    }

    // Play a full game and collect every turn.
    pub fn play<S: Spinner>(&self, spinner: S) -> Result<Outcome, GameError> {
        let mut turns = self.turns(spinner)?;
        let mut played = Vec::new();

        loop {
            let turn = turns.take_turn()?;
            let won = turn.is_win();
            played.push(turn);

            if won {
                let winner = turns.players[turns.next].clone();
                log::info!("{} won after {} turns", winner, played.len());

                return Ok(Outcome {
                    turns: played,
                    winner,
                    roster: turns.roster(),
                    rounds: turns.round() + 1,
                });
            }
        }
    }
}

impl Validate for Roster {
    fn validate(&self) -> Result<()> {
        let n_players = self.players.len();
        if n_players > MAX_PLAYERS {
            return Err(anyhow!("Number of players ({}) above the limit of {}", n_players, MAX_PLAYERS));
        }

        let mut names = HashSet::with_capacity(n_players);
        let mut colors = HashSet::with_capacity(n_players);
        for player in &self.players {
            if player.name.trim().is_empty() {
                return Err(anyhow!("Player with color {} has an empty name", player.color));
            }
            if !names.insert(player.name.as_str()) {
                return Err(anyhow!("Name {} is used more than once", player.name));
            }
            if !colors.insert(player.color) {
                return Err(anyhow!("Color {} is held by more than one player", player.color));
            }
            if !(0..=WINNING_SCORE).contains(&player.score) {
                return Err(anyhow!("Score {} of {} outside the bound [0, {}]", player.score, player.name, WINNING_SCORE));
            }
        }

        Ok(())
    }
}

// One spin by one player, with the player as they stand after it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Turn {
    spin: i32,
    score_before: i32,
    player: Player,
}

fn cherries(count: i32) -> &'static str {
    if count == 1 { "cherry" } else { "cherries" }
}

impl Turn {
    pub fn spin(&self) -> i32 {
        self.spin
    }

    pub fn score_before(&self) -> i32 {
        self.score_before
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    // Cherries actually gained (positive) or lost (negative) after clamping
    pub fn change(&self) -> i32 {
        self.player.score - self.score_before
    }

    pub fn is_win(&self) -> bool {
        self.player.has_won()
    }

    pub fn summary(&self) -> String {
        let change = self.change();
        if self.spin < 0 {
            format!("Oh noes! {} lost {} {}!!!", self.player, -change, cherries(-change))
        } else {
            format!("Yay! {} got {} more {}!!!", self.player, change, cherries(change))
        }
    }
}

pub fn apply_turn(player: &Player, spin: i32) -> (Player, Turn) {
    let updated = player.with_change(spin);
    let turn = Turn {
        spin,
        score_before: player.score,
        player: updated.clone(),
    };

    (updated, turn)
}

// Spinner backed by any fallible rand generator.
pub struct EntropySpinner<R> {
    rng: R,
}

impl<R: TryRngCore> EntropySpinner<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    // Uniform index in 0..n. Raw draws from the top sliver of the u32 range
    // that does not divide evenly by n are thrown away and redrawn.
    fn draw_index(&mut self, n: u32) -> Result<u32, GameError> {
        let span = 1u64 << 32;
        let limit = span - span % n as u64;

        loop {
            let raw = self.rng
                .try_next_u32()
                .map_err(|err| GameError::RandomSourceUnavailable(err.to_string()))?;
            if (raw as u64) < limit {
                return Ok(raw % n);
            }
        }
    }
}

impl EntropySpinner<OsRng> {
    pub fn os() -> Self {
        Self::new(OsRng)
    }
}

impl EntropySpinner<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: TryRngCore> Spinner for EntropySpinner<R> {
    fn spin(&mut self) -> Result<i32, GameError> {
        let idx = self.draw_index(SPINNER_VALUES.len() as u32)?;
        Ok(SPINNER_VALUES[idx as usize])
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Progress {
    InProgress,
    Complete,
    // The spinner failed; no more turns are handed out.
    Aborted,
}

// Turns of one game, produced on demand in seating order, round after round.
// Ends right after the winning turn, or after yielding the first error.
pub struct Turns<S> {
    players: Vec<Player>,
    spinner: S,
    // Seat of the player to spin next, or of the winner once complete
    next: usize,
    round: usize,
    progress: Progress,
}

impl<S> Turns<S> {
    pub fn progress(&self) -> Progress {
        self.progress
    }

    // Zero based index of the round being played
    pub fn round(&self) -> usize {
        self.round
    }

    pub fn winner(&self) -> Option<&Player> {
        match self.progress {
            Progress::Complete => self.players.get(self.next),
            _ => None,
        }
    }

    // Players with their current scores
    pub fn roster(&self) -> Roster {
        Roster { players: self.players.clone() }
    }
}

impl<S: Spinner> Turns<S> {
    // Spin for the player in `next`. Only called while the game is in
    // progress.
    fn take_turn(&mut self) -> Result<Turn, GameError> {
        let spin = match self.spinner.spin() {
            Ok(value) => value,
            Err(err) => {
                log::error!("Spinner failed in round {}: {}", self.round, err);
                self.progress = Progress::Aborted;
                return Err(err);
            }
        };

        let (player, turn) = apply_turn(&self.players[self.next], spin);
        log::debug!("Round {}: {} spun {} and has {}", self.round, player, spin, player.score);
        self.players[self.next] = player;

        if turn.is_win() {
            self.progress = Progress::Complete;
        } else {
            self.next += 1;
            if self.next == self.players.len() {
                self.next = 0;
                self.round += 1;
            }
        }

        Ok(turn)
    }
}

impl<S: Spinner> Iterator for Turns<S> {
    type Item = Result<Turn, GameError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.progress {
            Progress::InProgress => Some(self.take_turn()),
            Progress::Complete | Progress::Aborted => None,
        }
    }
}

impl<S: Spinner> FusedIterator for Turns<S> {}

impl<S> GameState for Turns<S> {
    fn is_round_over(&self) -> bool {
        match self.progress {
            Progress::InProgress => self.next == 0 && self.round > 0,
            _ => true,
        }
    }

    fn is_game_over(&self) -> bool {
        self.progress != Progress::InProgress
    }
}

// Result of a full game: every turn in play order, the winner and the
// players with their final scores.
#[derive(Clone, Debug, Serialize)]
pub struct Outcome {
    pub turns: Vec<Turn>,
    pub winner: Player,
    pub roster: Roster,
    pub rounds: usize,
}
