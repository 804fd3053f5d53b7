use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use crossterm::event::{self, Event};
use crossterm::style::{self as term, Stylize};
use games::cherry::{Color, EntropySpinner, Roster, Turn};
use games::{GameState, Spinner, Validate};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tui::InteractiveApp;

mod games;
mod tui;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(clap::Args)]
struct RosterArgs {
    /// Player as NAME:COLOR, repeat for up to four players
    #[arg(short, long = "player", value_parser = parse_player, required = true)]
    players: Vec<(String, Color)>,
    /// Seed the spinner for a reproducible game
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    Play {
        #[command(flatten)]
        roster: RosterArgs,
        /// Print the outcome as JSON instead of a transcript
        #[arg(long)]
        json: bool,
    },
    Simulate {
        #[command(flatten)]
        roster: RosterArgs,
        #[arg(short, long)]
        log_file: PathBuf,
        #[arg(short, long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
        games: u64,
    },
    Interactive {
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn parse_player(arg: &str) -> Result<(String, Color)> {
    let (name, color) = arg
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("expected NAME:COLOR, got {:?}", arg))?;
    Ok((name.to_string(), color.parse()?))
}

fn build_roster(args: &RosterArgs) -> Result<Roster> {
    let mut roster = Roster::new();
    for (name, color) in &args.players {
        roster = roster
            .add_player(name, *color)
            .with_context(|| format!("Cannot seat {} with color {}", name, color))?;
    }
    roster.validate()?;

    Ok(roster)
}

fn spinner_for(seed: Option<u64>) -> Box<dyn Spinner + Send> {
    match seed {
        Some(seed) => Box::new(EntropySpinner::seeded(seed)),
        None => Box::new(EntropySpinner::os()),
    }
}

fn term_color(color: Color) -> term::Color {
    match color {
        Color::Blue => term::Color::Blue,
        Color::Green => term::Color::Green,
        Color::Red => term::Color::Red,
        Color::Yellow => term::Color::Yellow,
    }
}

fn play(args: &RosterArgs, json: bool) -> Result<()> {
    let roster = build_roster(args)?;
    let outcome = roster.play(spinner_for(args.seed))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    for turn in &outcome.turns {
        println!("{}", turn.summary().with(term_color(turn.player().color())));
    }
    println!("{}", format!("{} won!", outcome.winner).with(term_color(outcome.winner.color())).bold());
    println!("The game lasted {} rounds", outcome.rounds);

    Ok(())
}

// One turn in the simulation log
#[derive(Debug, Clone, serde::Serialize)]
struct PlayLogTurn {
    game_id: usize,
    round_id: usize,
    ply_id: usize,
    player: String,
    color: Color,
    spin: i32,
    score_before: i32,
    score: i32,
    win: bool,
}

impl PlayLogTurn {
    fn new(game_id: usize, round_id: usize, ply_id: usize, turn: &Turn) -> Self {
        Self {
            game_id,
            round_id,
            ply_id,
            player: turn.player().name().to_string(),
            color: turn.player().color(),
            spin: turn.spin(),
            score_before: turn.score_before(),
            score: turn.player().score(),
            win: turn.is_win(),
        }
    }
}

type PlayLog = Vec<PlayLogTurn>;

fn write_play_log(play_log: &[PlayLogTurn], file: &Path) -> Result<()> {
    let handle = File::create(file).with_context(|| format!("Cannot create {}", file.display()))?;
    let mut writer = BufWriter::new(handle);
    for item in play_log {
        jsonl::write(&mut writer, item).map_err(|err| anyhow!("Failed to write play log record: {:?}", err))?;
    }
    writer.flush().with_context(|| format!("Cannot flush {}", file.display()))?;

    Ok(())
}

fn report(winners: &[String], roster: &Roster) {
    let mut win_counts: HashMap<&str, usize> = roster.players().iter().map(|p| (p.name(), 0)).collect();
    let total_games = winners.len();

    for name in winners {
        if let Some(count) = win_counts.get_mut(name.as_str()) {
            *count += 1;
        }
    }

    for player in roster.players() {
        let wins = win_counts[player.name()];
        println!("Win count for {}: {}/{}, ratio: {}", player, wins, total_games, wins as f64 / total_games as f64);
    }
}

fn simulate_game(roster: &Roster, game_id: usize, seed: Option<u64>) -> Result<(String, PlayLog)> {
    let mut turns = roster.turns(spinner_for(seed.map(|s| s.wrapping_add(game_id as u64))))?;
    let mut play_log = Vec::new();

    loop {
        let round_id = turns.round();
        let turn = match turns.next() {
            Some(turn) => turn?,
            None => break,
        };
        play_log.push(PlayLogTurn::new(game_id, round_id, play_log.len(), &turn));

        if turns.is_round_over() && !turns.is_game_over() {
            log::debug!("Game {}: round {} over", game_id, round_id);
        }
    }

    let winner = turns
        .winner()
        .ok_or_else(|| anyhow!("Game {} ended as {:?} without a winner", game_id, turns.progress()))?
        .name()
        .to_string();
    log::info!("Game {}: winner is {} after {} turns", game_id, winner, play_log.len());

    Ok((winner, play_log))
}

fn simulate(args: &RosterArgs, log_file: &Path, n_sims: usize) -> Result<()> {
    if n_sims == 0 {
        bail!("Run at least one simulation");
    }
    let roster = build_roster(args)?;
    log::info!("Running {} simulations for {} players", n_sims, roster.player_count());

    let games: Vec<(String, PlayLog)> = (0..n_sims)
        .into_par_iter()
        .map(|game_id| simulate_game(&roster, game_id, args.seed))
        .collect::<Result<_>>()?;

    let (winners, logs): (Vec<String>, Vec<PlayLog>) = games.into_iter().unzip();
    report(&winners, &roster);
    write_play_log(&logs.concat(), log_file)
}

fn run_interactive(seed: Option<u64>) -> Result<()> {
    color_eyre::install().map_err(anyhow::Error::msg)?;
    let mut terminal = ratatui::init();
    let mut app = InteractiveApp::new(spinner_for(seed));

    let result = event_loop(&mut terminal, &mut app);
    ratatui::restore();
    result
}

fn event_loop(terminal: &mut ratatui::DefaultTerminal, app: &mut InteractiveApp) -> Result<()> {
    loop {
        terminal.draw(|frame| {
            frame.render_widget(&*app, frame.area());
        })?;

        if let Event::Key(key_event) = event::read()? {
            if app.handle_key(key_event) {
                return Ok(());
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.commands {
        Commands::Play { roster, json } => play(&roster, json),
        Commands::Simulate { roster, log_file, games } => simulate(&roster, &log_file, games as usize),
        Commands::Interactive { seed } => run_interactive(seed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster_args(players: &[&str]) -> RosterArgs {
        RosterArgs {
            players: players.iter().map(|p| parse_player(p).unwrap()).collect(),
            seed: Some(5),
        }
    }

    #[test]
    fn test_parse_player() {
        assert_eq!(parse_player("Alice:blue").unwrap(), ("Alice".to_string(), Color::Blue));
        assert_eq!(parse_player("Mr: T:Red").unwrap(), ("Mr: T".to_string(), Color::Red));
        assert!(parse_player("Alice").is_err());
        assert!(parse_player("Alice:purple").is_err());
    }

    #[test]
    fn test_build_roster() {
        let roster = build_roster(&roster_args(&["Alice:blue", "Bob:red"])).unwrap();
        assert_eq!(roster.player_count(), 2);

        assert!(build_roster(&roster_args(&["Alice:blue", "Bob:blue"])).is_err());
        assert!(build_roster(&roster_args(&["A:blue", "B:red", "C:green", "D:yellow", "E:blue"])).is_err());
    }

    #[test]
    fn test_simulate_game_log() {
        let roster = build_roster(&roster_args(&["Alice:blue", "Bob:red"])).unwrap();
        let (winner, play_log) = simulate_game(&roster, 3, Some(9)).unwrap();

        let last = play_log.last().unwrap();
        assert!(last.win);
        assert_eq!(last.player, winner);
        assert_eq!(play_log.iter().filter(|t| t.win).count(), 1);
        for (i, turn) in play_log.iter().enumerate() {
            assert_eq!(turn.ply_id, i);
            assert_eq!(turn.round_id, i / 2);
            assert_eq!(turn.game_id, 3);
        }

        // Same seed, same game
        let (again, _) = simulate_game(&roster, 3, Some(9)).unwrap();
        assert_eq!(again, winner);
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["cherry-o", "play", "-p", "Alice:blue", "--player", "Bob:red", "--seed", "4"]).unwrap();
        match args.commands {
            Commands::Play { roster, json } => {
                assert!(!json);
                assert_eq!(roster.players.len(), 2);
                assert_eq!(roster.seed, Some(4));
            },
            _ => panic!("expected the play command"),
        }

        assert!(Args::try_parse_from(["cherry-o", "play"]).is_err());
    }

    #[test]
    fn test_simulate_needs_games() {
        let parsed = Args::try_parse_from(["cherry-o", "simulate", "-p", "A:blue", "-l", "out.jsonl", "--games", "0"]);
        assert!(parsed.is_err());

        let args = Args::try_parse_from(["cherry-o", "simulate", "-p", "A:blue", "-l", "out.jsonl"]).unwrap();
        match args.commands {
            Commands::Simulate { games, .. } => assert_eq!(games, 100),
            _ => panic!("expected the simulate command"),
        }

        let missing = std::env::temp_dir().join("cherry-o-no-such-dir").join("never.jsonl");
        let err = simulate(&roster_args(&["A:blue"]), &missing, 0).unwrap_err();
        assert!(err.to_string().contains("at least one"));
        assert!(!missing.exists());
    }
}
