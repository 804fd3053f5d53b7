use crate::games::cherry::{Color, GameError, Player, Roster, Turn, MAX_PLAYERS, WINNING_SCORE};
use crate::games::Spinner;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::layout::{Constraint, Direction, Flex, Layout};
use ratatui::style::{self, Modifier, Style};
use ratatui::text::Span;
use ratatui::widgets::{BorderType, Clear, HighlightSpacing, List, ListState, StatefulWidget};

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Stylize,
    symbols::border,
    text::{Line, Text},
    widgets::{Block, Paragraph, Widget},
};

const BLOCK_CHAR: &str = "█";

// What the user is doing right now; decides both key handling and drawing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Mode {
    Main,
    AddPlayer,
    RemovePlayer,
    Error(String),
}

pub struct InteractiveApp {
    pub roster: Roster,
    pub mode: Mode,
    pub name_input: String,
    pub colors: Vec<Color>,
    pub colors_state: ListState,
    pub players_state: ListState,
    // Turns of the latest game, in play order
    pub turns: Vec<Turn>,
    pub winner: Option<Player>,
    pub rounds: usize,
    pub games_played: usize,
    spinner: Box<dyn Spinner>,
}

// A row in one of the selection lists
pub enum Entry<'a> {
    Color(Color),
    Player { player: &'a Player, winner: bool },
}

fn token_color(color: Color) -> style::Color {
    match color {
        Color::Blue => style::Color::Blue,
        Color::Green => style::Color::Green,
        Color::Red => style::Color::Red,
        Color::Yellow => style::Color::Yellow,
    }
}

impl Entry<'_> {
    pub fn line(&self) -> Line<'static> {
        match self {
            Entry::Color(color) => Line::from(vec![
                Span::styled(BLOCK_CHAR, Style::default().fg(token_color(*color))),
                " ".into(),
                Span::styled(color.name(), Style::default().fg(token_color(*color))),
            ]),
            Entry::Player { player, winner } => Line::from(vec![
                Span::styled(BLOCK_CHAR, Style::default().fg(token_color(player.color()))),
                format!(" {:<16}", player.name()).into(),
                format!("{:>2}/{}", player.score(), WINNING_SCORE).into(),
                if *winner { " 👑".into() } else { "".into() },
            ]),
        }
    }
}

// Move a list selection one step within [0, len)
fn step(state: &mut ListState, len: usize, down: bool) {
    if len == 0 {
        state.select(None);
        return;
    }

    let next = match (state.selected(), down) {
        (None, _) => 0,
        (Some(i), true) => std::cmp::min(i + 1, len - 1),
        (Some(i), false) => i.saturating_sub(1),
    };
    state.select(Some(next));
}

impl InteractiveApp {
    pub fn new(spinner: Box<dyn Spinner>) -> Self {
        Self {
            roster: Roster::new(),
            mode: Mode::Main,
            name_input: String::new(),
            colors: Vec::new(),
            colors_state: ListState::default(),
            players_state: ListState::default(),
            turns: Vec::new(),
            winner: None,
            rounds: 0,
            games_played: 0,
            spinner,
        }
    }

    // Handle one key press. Returns true when the user asked to quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return true;
        }

        match self.mode {
            Mode::Main => return self.main_key(key.code),
            Mode::AddPlayer => self.add_player_key(key.code),
            Mode::RemovePlayer => self.remove_player_key(key.code),
            Mode::Error(_) => {
                if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                    self.mode = Mode::Main;
                }
            }
        }

        false
    }

    fn main_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('a') => {
                if self.roster.is_full() {
                    self.fail(GameError::RosterFull);
                } else {
                    self.name_input.clear();
                    self.colors = self.roster.available_colors();
                    self.colors_state.select_first();
                    self.mode = Mode::AddPlayer;
                }
            },
            KeyCode::Char('r') => {
                if self.roster.player_count() == 0 {
                    self.fail(GameError::RosterEmpty);
                } else {
                    self.players_state.select_first();
                    self.mode = Mode::RemovePlayer;
                }
            },
            KeyCode::Char('p') => self.play(),
            _ => {}
        }

        false
    }

    fn add_player_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => self.mode = Mode::Main,
            KeyCode::Up => step(&mut self.colors_state, self.colors.len(), false),
            KeyCode::Down => step(&mut self.colors_state, self.colors.len(), true),
            KeyCode::Backspace => {
                self.name_input.pop();
            },
            KeyCode::Char(c) => self.name_input.push(c),
            KeyCode::Enter => {
                let color = match self.colors_state.selected().and_then(|i| self.colors.get(i)) {
                    Some(&color) => color,
                    None => return,
                };

                match self.roster.add_player(&self.name_input, color) {
                    Ok(roster) => {
                        log::info!("Added {} with color {}", self.name_input.trim(), color);
                        self.replace_roster(roster);
                        self.mode = Mode::Main;
                    },
                    Err(err) => self.fail(err),
                }
                self.name_input.clear();
            },
            _ => {}
        }
    }

    fn remove_player_key(&mut self, code: KeyCode) {
        let n_players = self.roster.player_count();

        match code {
            KeyCode::Esc => self.mode = Mode::Main,
            KeyCode::Up | KeyCode::Char('k') => step(&mut self.players_state, n_players, false),
            KeyCode::Down | KeyCode::Char('j') => step(&mut self.players_state, n_players, true),
            KeyCode::Enter => {
                let name = match self.players_state.selected().and_then(|i| self.roster.players().get(i)) {
                    Some(player) => player.name().to_string(),
                    None => return,
                };

                match self.roster.remove_player(&name) {
                    Ok(roster) => {
                        log::info!("Removed {}", name);
                        self.replace_roster(roster);
                        self.mode = Mode::Main;
                    },
                    Err(err) => self.fail(err),
                }
            },
            _ => {}
        }
    }

    // Scores from the previous game mean nothing once the table changes
    fn replace_roster(&mut self, roster: Roster) {
        self.roster = roster.reset_scores();
        self.turns.clear();
        self.winner = None;
        self.rounds = 0;
    }

    fn play(&mut self) {
        match self.roster.reset_scores().play(&mut self.spinner) {
            Ok(outcome) => {
                self.roster = outcome.roster;
                self.turns = outcome.turns;
                self.winner = Some(outcome.winner);
                self.rounds = outcome.rounds;
                self.games_played += 1;
            },
            Err(err) => self.fail(err),
        }
    }

    fn fail(&mut self, err: GameError) {
        if err.is_fatal() {
            log::error!("{}", err);
        } else {
            log::warn!("{}", err);
        }
        self.mode = Mode::Error(err.to_string());
    }

    fn is_winner(&self, player: &Player) -> bool {
        self.winner.as_ref().is_some_and(|w| w.name() == player.name())
    }

    fn turn_line(&self, turn: &Turn) -> Line<'static> {
        let style = Style::default().fg(token_color(turn.player().color()));
        Line::from(Span::styled(format!(" {}", turn.summary()), style))
    }

    fn key_hints(&self) -> Line<'static> {
        let hints: Vec<(&str, &str)> = match self.mode {
            Mode::Main => vec![(" Add ", "<a> "), (" Remove ", "<r> "), (" Play ", "<p> "), (" Quit ", "<q> ")],
            Mode::AddPlayer => vec![(" Color ", "<↑/↓> "), (" Submit ", "<RET> "), (" Cancel ", "<ESC> ")],
            Mode::RemovePlayer => vec![(" Player ", "<↑/↓> "), (" Remove ", "<RET> "), (" Cancel ", "<ESC> ")],
            Mode::Error(_) => vec![(" Dismiss ", "<RET> ")],
        };

        let mut spans = Vec::with_capacity(hints.len() * 2);
        for (label, key) in hints {
            spans.push(Span::raw(label));
            spans.push(key.blue().bold());
        }
        Line::from(spans).right_aligned()
    }

    fn render_players(&self, area: Rect, buf: &mut Buffer) {
        let block = Block::bordered()
            .title(Line::from(format!(" Players {}/{} ", self.roster.player_count(), MAX_PLAYERS).bold()))
            .border_type(if self.mode == Mode::RemovePlayer { BorderType::Thick } else { BorderType::Plain });

        let items = List::new(self.roster.players().iter().map(|player| {
            Entry::Player { player, winner: self.is_winner(player) }.line()
        }))
            .block(block)
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol(" →")
            .highlight_spacing(HighlightSpacing::Always);

        let mut state = if self.mode == Mode::RemovePlayer { self.players_state.clone() } else { ListState::default() };
        StatefulWidget::render(items, area, buf, &mut state);
    }

    fn render_turns(&self, area: Rect, buf: &mut Buffer) {
        let mut lines: Vec<Line> = self.turns.iter().map(|t| self.turn_line(t)).collect();
        if let Some(winner) = &self.winner {
            lines.push(Line::from(Span::styled(
                format!(" {} won!", winner),
                Style::default().fg(token_color(winner.color())).add_modifier(Modifier::BOLD),
            )));
        }
        if lines.is_empty() {
            lines.push(" Press <p> to play a game".italic().into());
        }

        // Keep the tail of the log in view
        let visible = area.height.saturating_sub(2) as usize;
        let skip = lines.len().saturating_sub(visible);
        let lines: Vec<Line> = lines.into_iter().skip(skip).collect();

        Paragraph::new(Text::from(lines))
            .block(Block::bordered().title(Line::from(" Turns ".bold()).centered()))
            .render(area, buf);
    }

    fn render_add_player(&self, area: Rect, buf: &mut Buffer) {
        let area = popup_area(area, 6 + self.colors.len() as u16);
        Clear.render(area, buf);

        let block = Block::bordered()
            .border_type(BorderType::Thick)
            .title(" Add Player ");
        let inner = block.inner(area);
        block.render(area, buf);

        let [name_area, colors_area] = Layout::vertical([Constraint::Length(3), Constraint::Min(1)]).areas(inner);

        Paragraph::new(vec![
            Line::from(""),
            Line::from(vec!["  Name: ".italic(), Span::raw(format!("{}_", self.name_input))]),
        ]).render(name_area, buf);

        let items = List::new(self.colors.iter().map(|&c| Entry::Color(c).line()))
            .highlight_style(Style::default().add_modifier(Modifier::BOLD))
            .highlight_symbol("  >")
            .highlight_spacing(HighlightSpacing::Always);
        StatefulWidget::render(items, colors_area, buf, &mut self.colors_state.clone());
    }

    fn render_error(&self, message: &str, area: Rect, buf: &mut Buffer) {
        let area = popup_area(area, 5);
        Clear.render(area, buf);

        Paragraph::new(vec![Line::from(""), Line::from(format!("  {}", message))])
            .block(Block::bordered()
                .border_type(BorderType::Thick)
                .border_style(Style::default().fg(style::Color::Red))
                .title(" Error "))
            .render(area, buf);
    }
}

fn popup_area(area: Rect, height: u16) -> Rect {
    let vertical = Layout::vertical([Constraint::Length(height)]).flex(Flex::Center);
    let horizontal = Layout::horizontal([Constraint::Percentage(60)]).flex(Flex::Center);
    let [area] = vertical.areas(area);
    let [area] = horizontal.areas(area);
    area
}

impl Widget for &InteractiveApp {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
            ])
            .split(area);

        let header_text = Text::from(vec![Line::from(vec![
            " ".into(),
            if self.winner.is_some() {
                Span::styled(" GAME OVER ", Style::default().fg(style::Color::Red)).bold().add_modifier(Modifier::REVERSED)
            } else {
                Span::styled(" SETTING UP ", Style::default().fg(style::Color::Blue)).bold().add_modifier(Modifier::REVERSED)
            },
            format!(" Players: {}, ", self.roster.player_count()).into(),
            format!("Rounds: {}, ", self.rounds).into(),
            format!("Games played: {}", self.games_played).into(),
        ])]);

        Paragraph::new(header_text)
            .block(Block::bordered().border_set(border::THICK).title(" Cherry-O ".bold()))
            .render(layout[0], buf);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(34), Constraint::Min(30)])
            .split(layout[1]);

        self.render_players(body[0], buf);
        self.render_turns(body[1], buf);

        Block::new()
            .title_bottom(self.key_hints())
            .render(layout[1], buf);

        match &self.mode {
            Mode::AddPlayer => self.render_add_player(area, buf),
            Mode::Error(message) => self.render_error(message, area, buf),
            Mode::Main | Mode::RemovePlayer => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::cherry::EntropySpinner;

    fn press(app: &mut InteractiveApp, code: KeyCode) -> bool {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_name(app: &mut InteractiveApp, name: &str) {
        for c in name.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn app_with(names: &[&str]) -> InteractiveApp {
        let mut app = InteractiveApp::new(Box::new(EntropySpinner::seeded(11)));
        for name in names {
            press(&mut app, KeyCode::Char('a'));
            type_name(&mut app, name);
            press(&mut app, KeyCode::Enter);
        }
        app
    }

    fn screen(app: &InteractiveApp) -> String {
        let area = Rect::new(0, 0, 100, 40);
        let mut buf = Buffer::empty(area);
        app.render(area, &mut buf);
        buf.content.iter().map(|cell| cell.symbol()).collect()
    }

    #[test]
    fn test_add_players_takes_first_free_color() {
        let app = app_with(&["Alice", "Bob"]);
        assert_eq!(app.mode, Mode::Main);
        let colors: Vec<Color> = app.roster.players().iter().map(|p| p.color()).collect();
        assert_eq!(colors, vec![Color::Blue, Color::Green]);
    }

    #[test]
    fn test_add_player_picks_selected_color() {
        let mut app = app_with(&[]);
        press(&mut app, KeyCode::Char('a'));
        type_name(&mut app, "Carol");
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.roster.find("Carol").unwrap().color(), Color::Red);
    }

    #[test]
    fn test_add_player_errors_are_shown() {
        let mut app = app_with(&[]);
        press(&mut app, KeyCode::Char('a'));
        press(&mut app, KeyCode::Enter);
        assert!(matches!(app.mode, Mode::Error(_)));
        assert_eq!(app.roster.player_count(), 0);

        press(&mut app, KeyCode::Enter);
        assert_eq!(app.mode, Mode::Main);

        let mut app = app_with(&["A", "B", "C", "D"]);
        assert_eq!(app.roster.player_count(), 4);
        press(&mut app, KeyCode::Char('a'));
        assert_eq!(app.mode, Mode::Error(GameError::RosterFull.to_string()));
    }

    #[test]
    fn test_remove_player() {
        let mut app = app_with(&["Alice", "Bob", "Carol"]);
        press(&mut app, KeyCode::Char('r'));
        assert_eq!(app.mode, Mode::RemovePlayer);
        press(&mut app, KeyCode::Char('j'));
        press(&mut app, KeyCode::Enter);

        let names: Vec<&str> = app.roster.players().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["Alice", "Carol"]);
        assert_eq!(app.mode, Mode::Main);

        let mut app = app_with(&[]);
        press(&mut app, KeyCode::Char('r'));
        assert_eq!(app.mode, Mode::Error(GameError::RosterEmpty.to_string()));
    }

    #[test]
    fn test_play() {
        let mut app = app_with(&[]);
        press(&mut app, KeyCode::Char('p'));
        assert_eq!(app.mode, Mode::Error(GameError::NoPlayers.to_string()));
        press(&mut app, KeyCode::Esc);

        let mut app = app_with(&["Alice", "Bob"]);
        press(&mut app, KeyCode::Char('p'));
        assert_eq!(app.mode, Mode::Main);
        assert_eq!(app.games_played, 1);
        assert_eq!(app.winner.as_ref().unwrap().score(), WINNING_SCORE);
        assert!(app.turns.last().unwrap().is_win());

        // A second game starts from zero again
        press(&mut app, KeyCode::Char('p'));
        assert_eq!(app.games_played, 2);
        assert_eq!(app.turns[0].score_before(), 0);
    }

    #[test]
    fn test_quit_keys() {
        let mut app = app_with(&[]);
        assert!(app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
        assert!(press(&mut app, KeyCode::Char('q')));

        // In the name field 'q' is just a letter
        press(&mut app, KeyCode::Char('a'));
        assert!(!press(&mut app, KeyCode::Char('q')));
        assert_eq!(app.name_input, "q");
    }

    #[test]
    fn test_render() {
        let mut app = app_with(&["Alice", "Bob"]);
        let text = screen(&app);
        assert!(text.contains("Alice"));
        assert!(text.contains("Press <p> to play a game"));

        press(&mut app, KeyCode::Char('p'));
        let text = screen(&app);
        assert!(text.contains("GAME OVER"));
        assert!(text.contains("won!"));

        press(&mut app, KeyCode::Char('a'));
        let text = screen(&app);
        assert!(text.contains("Add Player"));
        assert!(text.contains("red"));
    }

    #[test]
    fn test_entry_lines() {
        let line = Entry::Color(Color::Yellow).line();
        assert_eq!(line.spans[2].content, "yellow");

        let app = app_with(&["Alice"]);
        let player = &app.roster.players()[0];
        let line = Entry::Player { player, winner: true }.line();
        assert!(line.spans[1].content.contains("Alice"));
        assert_eq!(line.spans[3].content, " 👑");
    }
}
