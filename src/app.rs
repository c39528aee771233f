//! App: terminal init, asset barrier, fixed-rate frame loop and key handling.

use crate::GameConfig;
use crate::assets::{AssetManifest, PendingAssets, TokenRegistry};
use crate::game::{Field, GameState, TokenId};
use crate::input::{Action, key_to_action};
use crate::theme::Theme;
use anyhow::Result;
use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use ratatui::DefaultTerminal;
use std::time::{Duration, Instant};
use tachyonfx::Effect;

/// DAS (Delayed Auto-Shift): delay before a held arrow starts repeating.
const REPEAT_DELAY_MS: u64 = 170;
/// ARR (Auto-Repeat Rate): time between repeated nudges while holding.
const REPEAT_INTERVAL_MS: u64 = 50;
/// Frames a freshly merged token keeps its highlight ring.
const FLASH_FRAMES: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Loading,
    Playing,
    GameOver,
}

pub struct App {
    config: GameConfig,
    theme: Theme,
    frame_interval: Duration,
    screen: Screen,
    /// Loads still in flight; `None` once the barrier has resolved.
    loading: Option<PendingAssets>,
    loading_progress: (usize, usize),
    registry: Option<TokenRegistry>,
    state: Option<GameState>,
    field: Field,
    games_started: u64,
    last_frame: Instant,
    /// Auto-repeat needs key release events; without them every press is one nudge.
    repeat_enabled: bool,
    repeat_state: Option<(Action, Instant)>,
    last_repeat_fire: Option<Instant>,
    /// Merged tokens still highlighted, with frames left.
    flashes: Vec<(TokenId, u32)>,
    game_over_effect: Option<Effect>,
    game_over_effect_process_time: Option<Instant>,
}

impl App {
    pub fn new(config: GameConfig, theme: Theme, manifest: AssetManifest, frame_rate: f64) -> Self {
        let total = manifest.tier_count();
        let frame_rate = if frame_rate.is_finite() && frame_rate > 0.0 {
            frame_rate
        } else {
            60.0
        };
        let now = Instant::now();
        Self {
            config,
            theme,
            frame_interval: Duration::from_secs_f64(1.0 / frame_rate),
            screen: Screen::Loading,
            loading: Some(PendingAssets::spawn(manifest)),
            loading_progress: (0, total),
            registry: None,
            state: None,
            field: crate::ui::field_for_terminal(80, 24),
            games_started: 0,
            last_frame: now,
            repeat_enabled: false,
            repeat_state: None,
            last_repeat_fire: None,
            flashes: Vec::new(),
            game_over_effect: None,
            game_over_effect_process_time: None,
        }
    }

    /// Advance the loading barrier; start the game once every asset has reported.
    fn poll_assets(&mut self) {
        let Some(pending) = self.loading.take() else {
            return;
        };
        match pending.try_resolve() {
            Ok(registry) => {
                self.loading_progress = (registry.len(), registry.len());
                self.registry = Some(registry);
                self.start_game();
            }
            Err(pending) => {
                self.loading_progress = (pending.completed(), pending.total());
                self.loading = Some(pending);
            }
        }
    }

    fn start_game(&mut self) {
        let Some(registry) = self.registry.as_ref().filter(|r| !r.is_empty()) else {
            log::error!("no token tiers loaded");
            return;
        };
        let config = GameConfig {
            seed: self.config.seed.wrapping_add(self.games_started),
            ..self.config.clone()
        };
        self.games_started += 1;
        self.state = Some(GameState::new(self.field, registry.len(), &config));
        self.screen = Screen::Playing;
        self.last_frame = Instant::now();
        self.repeat_state = None;
        self.last_repeat_fire = None;
        self.flashes.clear();
        self.game_over_effect = None;
        self.game_over_effect_process_time = None;
        log::info!("game {} started (seed {})", self.games_started, config.seed);
    }

    fn apply_action(&mut self, action: Action) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        match action {
            Action::MoveLeft => state.nudge_left(),
            Action::MoveRight => state.nudge_right(),
            Action::Drop => {
                state.drop_current();
            }
            Action::Restart | Action::Quit | Action::None => {}
        }
    }

    fn tick_repeat(&mut self) {
        let Some((action, first)) = self.repeat_state else {
            return;
        };
        if first.elapsed() < Duration::from_millis(REPEAT_DELAY_MS) {
            return;
        }
        let now = Instant::now();
        let next =
            self.last_repeat_fire.unwrap_or(first) + Duration::from_millis(REPEAT_INTERVAL_MS);
        if now >= next {
            self.apply_action(action);
            self.last_repeat_fire = Some(now);
        }
    }

    /// One simulation frame plus the bookkeeping the screen needs.
    fn step(&mut self) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        state.frame();
        self.flashes.retain_mut(|(_, left)| {
            *left = left.saturating_sub(1);
            *left > 0
        });
        self.flashes
            .extend(state.last_merges.merges.iter().map(|m| (m.survivor, FLASH_FRAMES)));
        if state.is_over {
            self.screen = Screen::GameOver;
            self.repeat_state = None;
        }
    }

    /// Returns true when the app should exit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        let action = key_to_action(key);
        match key.kind {
            KeyEventKind::Press => {}
            KeyEventKind::Release => {
                if self.repeat_state.map(|(a, _)| a) == Some(action) {
                    self.repeat_state = None;
                    self.last_repeat_fire = None;
                }
                return false;
            }
            // Without release events the terminal's own repeats drive held arrows.
            KeyEventKind::Repeat => {
                if !self.repeat_enabled && self.screen == Screen::Playing && action.repeats() {
                    self.apply_action(action);
                }
                return false;
            }
        }
        if action == Action::Quit {
            return true;
        }
        // Already auto-repeating this key; ignore the OS repeats.
        if self.repeat_state.map(|(a, _)| a) == Some(action) {
            return false;
        }
        match self.screen {
            Screen::Loading => {}
            Screen::Playing => {
                self.apply_action(action);
                if self.repeat_enabled && action.repeats() {
                    self.repeat_state = Some((action, Instant::now()));
                    self.last_repeat_fire = None;
                }
            }
            Screen::GameOver => {
                if action == Action::Restart {
                    self.start_game();
                }
            }
        }
        false
    }

    pub fn run(&mut self) -> Result<()> {
        use crossterm::{
            event::{
                KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
                PushKeyboardEnhancementFlags,
            },
            execute,
            terminal::{
                EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
                size, supports_keyboard_enhancement,
            },
        };

        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        // Release events let held arrows stop repeating promptly.
        self.repeat_enabled = supports_keyboard_enhancement().unwrap_or(false)
            && execute!(
                stdout,
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )
            .is_ok();
        log::info!("key auto-repeat {}", if self.repeat_enabled { "on" } else { "off" });

        let mut terminal =
            ratatui::DefaultTerminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;

        // The field is sized once from the starting terminal.
        let (term_cols, term_rows) = size()?;
        self.field = crate::ui::field_for_terminal(term_cols, term_rows);
        log::info!(
            "terminal {}x{}, field {}x{}",
            term_cols,
            term_rows,
            self.field.width,
            self.field.height
        );

        let result = self.run_loop(&mut terminal);

        if self.repeat_enabled {
            let _ = execute!(std::io::stdout(), PopKeyboardEnhancementFlags);
        }
        execute!(std::io::stdout(), LeaveAlternateScreen)?;
        disable_raw_mode()?;

        result
    }

    fn run_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        loop {
            let now = Instant::now();
            if self.screen == Screen::Loading {
                self.poll_assets();
            }

            let flashing: Vec<TokenId> = self.flashes.iter().map(|(id, _)| *id).collect();
            terminal.draw(|f| {
                crate::ui::draw(
                    f,
                    self.screen,
                    &self.theme,
                    self.state.as_ref(),
                    self.registry.as_ref(),
                    self.loading_progress,
                    &flashing,
                    &mut self.game_over_effect,
                    &mut self.game_over_effect_process_time,
                    now,
                )
            })?;

            let timeout = self.frame_interval.saturating_sub(now.elapsed());
            if event::poll(timeout)? {
                while event::poll(Duration::ZERO)? {
                    if let Event::Key(key) = event::read()? {
                        if self.handle_key(key) {
                            return Ok(());
                        }
                    }
                }
            }

            if self.screen == Screen::Playing {
                self.tick_repeat();
                if self.last_frame.elapsed() >= self.frame_interval {
                    self.last_frame = Instant::now();
                    self.step();
                }
            }
        }
    }
}
