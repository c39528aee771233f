//! Layout and drawing: loading gauge, playfield, sidebar, game over.
//!
//! The playfield is drawn with half blocks (▀): every terminal cell holds two
//! field pixels stacked vertically, so one field pixel is one cell wide and
//! half a cell tall.

use crate::app::Screen;
use crate::assets::{Sprite, TokenKind, TokenRegistry};
use crate::game::{Field, GameState, TokenId};
use crate::theme::Theme;
use ratatui::Frame;
use ratatui::buffer::Buffer;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Gauge, Paragraph, Widget};
use std::time::Instant;
use tachyonfx::{Duration as TfxDuration, Effect, EffectRenderer, Interpolation, fx};

const SIDEBAR_WIDTH: u16 = 26;
/// Widest playfield in cells; wider terminals get margins instead.
const MAX_FIELD_COLS: u16 = 48;
const MIN_FIELD_COLS: u16 = 12;
const MIN_FIELD_ROWS: u16 = 8;
/// Next-token preview size in cells.
const PREVIEW_COLS: u16 = 8;
const PREVIEW_ROWS: u16 = 4;
/// Fade-in of the game-over panel.
const GAME_OVER_FADE_MS: u32 = 600;

/// Play field that fits a terminal of the given size next to the sidebar.
/// Computed once at startup; the field does not follow later resizes.
pub fn field_for_terminal(term_cols: u16, term_rows: u16) -> Field {
    let cols = term_cols
        .saturating_sub(2 + SIDEBAR_WIDTH)
        .clamp(MIN_FIELD_COLS, MAX_FIELD_COLS);
    let rows = term_rows.saturating_sub(2).max(MIN_FIELD_ROWS);
    Field::new(f32::from(cols), f32::from(rows) * 2.0)
}

/// Field size in terminal cells, border excluded.
fn field_cells(field: Field) -> (u16, u16) {
    (field.width.ceil() as u16, (field.height / 2.0).ceil() as u16)
}

/// Off-screen pixel grid, two pixels per terminal cell vertically.
struct PixelCanvas {
    width: usize,
    height: usize,
    pixels: Vec<Option<Color>>,
}

impl PixelCanvas {
    fn new(cols: u16, rows: u16) -> Self {
        let (width, height) = (cols as usize, rows as usize * 2);
        Self {
            width,
            height,
            pixels: vec![None; width * height],
        }
    }

    fn set(&mut self, x: i32, y: i32, color: Color) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        self.pixels[y as usize * self.width + x as usize] = Some(color);
    }

    fn get(&self, x: usize, y: usize) -> Option<Color> {
        self.pixels.get(y * self.width + x).copied().flatten()
    }

    /// Paint `sprite` clipped to a circle; `ring` outlines the rim.
    fn paint_circle(&mut self, sprite: &Sprite, cx: f32, cy: f32, r: f32, ring: Option<Color>) {
        if r <= 0.0 {
            return;
        }
        let (x0, x1) = ((cx - r).floor() as i32, (cx + r).ceil() as i32);
        let (y0, y1) = ((cy - r).floor() as i32, (cy + r).ceil() as i32);
        for py in y0..y1 {
            for px in x0..x1 {
                let dx = px as f32 + 0.5 - cx;
                let dy = py as f32 + 0.5 - cy;
                let d = dx.hypot(dy);
                if d > r {
                    continue;
                }
                let color = match ring {
                    Some(c) if d > r - 1.0 => c,
                    _ => {
                        let [red, green, blue] =
                            sprite.sample((dx + r) / (2.0 * r), (dy + r) / (2.0 * r));
                        Color::Rgb(red, green, blue)
                    }
                };
                self.set(px, py, color);
            }
        }
    }

    /// Copy into the buffer at `area`, one ▀ cell per pixel pair.
    fn blit(&self, buf: &mut Buffer, area: Rect, bg: Color) {
        let cols = (self.width as u16).min(area.width);
        let rows = ((self.height / 2) as u16).min(area.height);
        for row in 0..rows {
            for col in 0..cols {
                let top = self.get(col as usize, row as usize * 2).unwrap_or(bg);
                let bot = self.get(col as usize, row as usize * 2 + 1).unwrap_or(bg);
                buf[(area.x + col, area.y + row)]
                    .set_symbol("▀")
                    .set_style(Style::default().fg(top).bg(bot));
            }
        }
    }
}

/// Paint a token of `kind`; kinds whose image failed to load are skipped.
fn paint_token(
    canvas: &mut PixelCanvas,
    kind: Option<&TokenKind>,
    x: f32,
    y: f32,
    r: f32,
    ring: Option<Color>,
) {
    if let Some(sprite) = kind.and_then(|k| k.image.as_ref()) {
        canvas.paint_circle(sprite, x, y, r, ring);
    }
}

fn sprite_color(kind: &TokenKind) -> Option<Color> {
    kind.image.as_ref().map(|s| {
        let [r, g, b] = s.dominant();
        Color::Rgb(r, g, b)
    })
}

/// Rect of size (w, h) centred in `area`, clipped to it.
fn centered(area: Rect, w: u16, h: u16) -> Rect {
    Rect {
        x: area.x + area.width.saturating_sub(w) / 2,
        y: area.y + area.height.saturating_sub(h) / 2,
        width: w.min(area.width),
        height: h.min(area.height),
    }
}

/// Draw the current screen.
pub fn draw(
    frame: &mut Frame,
    screen: Screen,
    theme: &Theme,
    state: Option<&GameState>,
    registry: Option<&TokenRegistry>,
    loading: (usize, usize),
    flashing: &[TokenId],
    game_over_effect: &mut Option<Effect>,
    effect_process_time: &mut Option<Instant>,
    now: Instant,
) {
    let area = frame.area();
    frame
        .buffer_mut()
        .set_style(area, Style::default().bg(theme.bg));
    match (screen, state, registry) {
        (Screen::Playing, Some(state), Some(registry)) => {
            draw_game(frame, state, registry, theme, flashing, area);
        }
        (Screen::GameOver, Some(state), Some(registry)) => {
            draw_game_over(
                frame,
                state,
                registry,
                theme,
                area,
                game_over_effect,
                effect_process_time,
                now,
            );
        }
        _ => draw_loading(frame, theme, loading, area),
    }
}

fn draw_loading(frame: &mut Frame, theme: &Theme, (done, total): (usize, usize), area: Rect) {
    let popup = centered(area, 40, 5);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line))
        .title(Span::styled(" Loading tokens ", Style::default().fg(theme.title)));
    let inner = block.inner(popup);
    block.render(popup, frame.buffer_mut());
    let ratio = if total == 0 {
        1.0
    } else {
        (done as f64 / total as f64).min(1.0)
    };
    Gauge::default()
        .ratio(ratio)
        .label(format!("{}/{}", done, total))
        .gauge_style(Style::default().fg(theme.hi_fg).bg(theme.bg))
        .render(centered(inner, inner.width, 1), frame.buffer_mut());
}

/// Playfield + sidebar, centred as one unit.
fn draw_game(
    frame: &mut Frame,
    state: &GameState,
    registry: &TokenRegistry,
    theme: &Theme,
    flashing: &[TokenId],
    area: Rect,
) {
    let (cols, rows) = field_cells(state.field);
    let (pw, ph) = (cols + 2, rows + 2);
    let total_w = pw + SIDEBAR_WIDTH;

    let horiz = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(total_w),
            Constraint::Fill(1),
        ])
        .split(area);
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(ph),
            Constraint::Fill(1),
        ])
        .split(horiz[1]);
    let inner = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(pw), Constraint::Length(SIDEBAR_WIDTH)])
        .split(vert[1]);

    draw_playfield(frame, state, registry, theme, flashing, inner[0]);
    draw_sidebar(frame, state, registry, theme, inner[1]);
}

fn draw_playfield(
    frame: &mut Frame,
    state: &GameState,
    registry: &TokenRegistry,
    theme: &Theme,
    flashing: &[TokenId],
    area: Rect,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
        .title(Span::styled(
            format!(" tokendrop | Score: {} ", state.score),
            Style::default().fg(theme.title),
        ));
    let inner = block.inner(area);
    block.render(area, frame.buffer_mut());

    let mut canvas = PixelCanvas::new(inner.width, inner.height);

    // Drop guide: dotted line under the hanging token.
    let cur = state.current;
    let guide_x = cur.x.floor() as i32;
    let mut gy = (cur.y + cur.radius).ceil() as i32 + 1;
    while (gy as f32) < state.field.height {
        canvas.set(guide_x, gy, theme.div_line);
        gy += 3;
    }

    for t in &state.tokens {
        let ring = flashing.contains(&t.id).then_some(theme.hi_fg);
        paint_token(&mut canvas, registry.get(t.tier), t.x, t.y, t.radius, ring);
    }
    paint_token(
        &mut canvas,
        registry.get(cur.tier),
        cur.x,
        cur.y,
        cur.radius,
        None,
    );
    canvas.blit(frame.buffer_mut(), inner, theme.bg);
}

fn sidebar_block(theme: &Theme) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
}

fn draw_sidebar(
    frame: &mut Frame,
    state: &GameState,
    registry: &TokenRegistry,
    theme: &Theme,
    area: Rect,
) {
    let title_style = Style::default().fg(theme.title);
    let fg_style = Style::default().fg(theme.main_fg);
    let tiers_h = (registry.len() as u16 + 2).min(area.height.saturating_sub(14));

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(PREVIEW_ROWS + 3), // Next: title + preview + name
            Constraint::Length(6),                // Stats
            Constraint::Length(tiers_h),          // Tier ladder
            Constraint::Fill(1),
            Constraint::Length(1), // Key hints
        ])
        .split(area);

    // --- Next ---
    let next_block = sidebar_block(theme);
    let next_inner = next_block.inner(chunks[0]);
    next_block.render(chunks[0], frame.buffer_mut());
    let next_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(PREVIEW_ROWS), Constraint::Length(1)])
        .split(next_inner);
    draw_next_preview(frame, state, registry, theme, next_layout[0]);
    Paragraph::new(Line::from(vec![
        Span::styled("Next: ", title_style),
        Span::styled(registry.name(state.current.tier), fg_style),
    ]))
    .render(next_layout[1], frame.buffer_mut());

    // --- Stats ---
    let stats_block = sidebar_block(theme);
    let stats_inner = stats_block.inner(chunks[1]);
    stats_block.render(chunks[1], frame.buffer_mut());
    let stat = |label: &'static str, value: String| {
        Line::from(vec![
            Span::styled(label, title_style),
            Span::styled(value, fg_style),
        ])
    };
    Paragraph::new(Text::from(vec![
        stat("Score: ", state.score.to_string()),
        stat("Tokens: ", state.tokens.len().to_string()),
        stat("Merges: ", state.merges.to_string()),
        stat("Best: ", registry.name(state.best_tier).to_string()),
    ]))
    .render(stats_inner, frame.buffer_mut());

    // --- Tier ladder ---
    if tiers_h > 2 {
        let tiers_block = sidebar_block(theme).title(Span::styled(" Tiers ", title_style));
        let tiers_inner = tiers_block.inner(chunks[2]);
        tiers_block.render(chunks[2], frame.buffer_mut());
        let lines: Vec<Line> = registry
            .iter()
            .map(|kind| tier_line(kind, state, theme))
            .collect();
        Paragraph::new(Text::from(lines)).render(tiers_inner, frame.buffer_mut());
    }

    Paragraph::new(Span::styled(
        "←/→ move  space drop  q quit",
        Style::default().fg(theme.inactive_fg),
    ))
    .render(chunks[4], frame.buffer_mut());
}

fn tier_line<'a>(kind: &'a TokenKind, state: &GameState, theme: &Theme) -> Line<'a> {
    let (bullet, bullet_color) = match sprite_color(kind) {
        Some(c) => ("●", c),
        None => ("○", theme.inactive_fg),
    };
    let is_next = kind.tier == state.current.tier;
    let name_style = if is_next {
        Style::default().fg(theme.hi_fg).add_modifier(Modifier::BOLD)
    } else if kind.tier <= state.best_tier {
        Style::default().fg(theme.main_fg)
    } else {
        Style::default().fg(theme.inactive_fg)
    };
    let mut spans = vec![
        Span::styled(format!("{:>2} ", kind.tier + 1), Style::default().fg(theme.inactive_fg)),
        Span::styled(bullet, Style::default().fg(bullet_color)),
        Span::raw(" "),
        Span::styled(kind.name.as_str(), name_style),
    ];
    if is_next {
        spans.push(Span::styled(" ◀", Style::default().fg(theme.hi_fg)));
    }
    Line::from(spans)
}

/// The hanging token, drawn large.
fn draw_next_preview(
    frame: &mut Frame,
    state: &GameState,
    registry: &TokenRegistry,
    theme: &Theme,
    area: Rect,
) {
    let rect = centered(area, PREVIEW_COLS, PREVIEW_ROWS);
    let mut canvas = PixelCanvas::new(rect.width, rect.height);
    let r = f32::from(rect.width.min(rect.height * 2)) / 2.0;
    paint_token(
        &mut canvas,
        registry.get(state.current.tier),
        f32::from(rect.width) / 2.0,
        f32::from(rect.height),
        r,
        None,
    );
    canvas.blit(frame.buffer_mut(), rect, theme.bg);
}

/// Terminal screen: only the centred panel, no simulation.
fn draw_game_over(
    frame: &mut Frame,
    state: &GameState,
    registry: &TokenRegistry,
    theme: &Theme,
    area: Rect,
    effect: &mut Option<Effect>,
    process_time: &mut Option<Instant>,
    now: Instant,
) {
    let panel = centered(area, 34, 9);
    Clear.render(panel, frame.buffer_mut());
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.title).bg(theme.bg));
    let inner = block.inner(panel);
    block.render(panel, frame.buffer_mut());

    let lines = vec![
        Line::from(Span::styled(
            "Game Over",
            Style::default().fg(theme.title).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("Score: ", Style::default().fg(theme.title)),
            Span::styled(state.score.to_string(), Style::default().fg(theme.main_fg)),
        ]),
        Line::from(vec![
            Span::styled("Best: ", Style::default().fg(theme.title)),
            Span::styled(registry.name(state.best_tier), Style::default().fg(theme.main_fg)),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "r restart   q quit",
            Style::default().fg(theme.inactive_fg),
        )),
    ];
    Paragraph::new(Text::from(lines))
        .alignment(Alignment::Center)
        .style(Style::default().bg(theme.bg))
        .render(inner, frame.buffer_mut());

    let delta = process_time
        .map(|t| now.saturating_duration_since(t))
        .unwrap_or(std::time::Duration::ZERO);
    *process_time = Some(now);
    let delta_ms = delta.as_millis().min(u32::MAX as u128) as u32;
    let fade = effect.get_or_insert_with(|| {
        fx::fade_from(theme.bg, theme.bg, (GAME_OVER_FADE_MS, Interpolation::QuadOut))
            .with_area(panel)
    });
    frame.render_effect(fade, panel, TfxDuration::from_millis(delta_ms));
}
