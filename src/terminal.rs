use crate::error::VizError;
use crate::presentation::{FrameStatus, Frontend};
use crate::types::{Rect, Rgb};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::{cursor, queue, terminal};
use log::debug;
use std::io::{self, Stdout, Write};
use std::thread;
use std::time::{Duration, Instant};

pub const CAPTION: &str = "keyviz: keyboard";

/// Renders the virtual screen as coloured terminal cells.
///
/// The virtual screen (`width × height` pixels) is scaled onto every row but
/// the last, which carries a status line. Drawing goes into a back buffer;
/// `present` writes only the cells that differ from what is on screen.
pub struct TerminalFrontend {
    out: Stdout,
    width: u32,
    height: u32,
    background: Rgb,
    cols: u16,
    rows: u16,
    back: Vec<Rgb>,
    front: Vec<Option<Rgb>>,
    epoch: Instant,
    last_tick: Instant,
}

impl TerminalFrontend {
    /// Switch the terminal to the alternate screen in raw mode. The original
    /// state comes back when the frontend is dropped.
    pub fn open(width: u32, height: u32, background: Rgb) -> Result<Self, VizError> {
        let (cols, term_rows) = terminal::size()?;
        terminal::enable_raw_mode()?;

        let mut out = io::stdout();
        let entered = queue!(out, terminal::EnterAlternateScreen, cursor::Hide)
            .and_then(|_| out.flush());
        if let Err(e) = entered {
            let _ = terminal::disable_raw_mode();
            return Err(e.into());
        }

        let now = Instant::now();
        let mut fe = Self {
            out,
            width: width.max(1),
            height: height.max(1),
            background,
            cols: 0,
            rows: 0,
            back: Vec::new(),
            front: Vec::new(),
            epoch: now,
            last_tick: now,
        };
        fe.resize(cols, term_rows);
        Ok(fe)
    }

    fn resize(&mut self, cols: u16, term_rows: u16) {
        self.cols = cols.max(1);
        self.rows = term_rows.saturating_sub(1).max(1);
        let cells = self.cols as usize * self.rows as usize;
        self.back = vec![self.background; cells];
        // Unknown front buffer forces a full repaint
        self.front = vec![None; cells];
        debug!("Terminal grid {}x{}", self.cols, self.rows);
    }

    fn write_status(&mut self, status: &FrameStatus) -> io::Result<()> {
        let line = format!(
            "{CAPTION} | t={:>7.2}s | fps: {:>3.0} | notes: {:>3} live, {:>5} pending | Esc/q quits",
            status.time, status.fps, status.live_tokens, status.pending_events
        );
        let line: String = line.chars().take(self.cols as usize).collect();
        queue!(
            self.out,
            cursor::MoveTo(0, self.rows),
            ResetColor,
            SetForegroundColor(Color::White),
            terminal::Clear(terminal::ClearType::CurrentLine),
            Print(line),
            ResetColor
        )
    }
}

impl Frontend for TerminalFrontend {
    fn poll_stop(&mut self) -> Result<bool, VizError> {
        let mut stop = false;
        while event::poll(Duration::ZERO)? {
            match event::read()? {
                Event::Key(key) if is_quit_key(&key) => stop = true,
                Event::Resize(cols, rows) => {
                    queue!(self.out, ResetColor, terminal::Clear(terminal::ClearType::All))?;
                    self.resize(cols, rows);
                }
                _ => {}
            }
        }
        Ok(stop)
    }

    fn elapsed(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn draw_rect(&mut self, rect: Rect, color: Rgb) -> Result<(), VizError> {
        let (c0, c1) = span(rect.x, rect.right(), self.width, self.cols);
        let (r0, r1) = span(rect.y, rect.bottom(), self.height, self.rows);
        for r in r0..r1 {
            let row = r as usize * self.cols as usize;
            for c in c0..c1 {
                self.back[row + c as usize] = color;
            }
        }
        Ok(())
    }

    fn present(&mut self, status: &FrameStatus) -> Result<(), VizError> {
        let mut pen: Option<Rgb> = None;
        for r in 0..self.rows {
            for c in 0..self.cols {
                let i = r as usize * self.cols as usize + c as usize;
                let cell = self.back[i];
                if self.front[i] == Some(cell) {
                    continue;
                }
                if pen != Some(cell) {
                    queue!(self.out, SetBackgroundColor(to_color(cell)))?;
                    pen = Some(cell);
                }
                queue!(self.out, cursor::MoveTo(c, r), Print(' '))?;
                self.front[i] = Some(cell);
            }
        }
        self.write_status(status)?;
        self.out.flush()?;

        // Start the next frame from an empty keyboard
        self.back.fill(self.background);
        Ok(())
    }

    fn pace(&mut self, fps: f64) {
        if let Some(period) = frame_period(fps) {
            let now = Instant::now();
            if let Some(target) = self.last_tick.checked_add(period) {
                if now < target {
                    thread::sleep(target - now);
                }
            }
        }
        self.last_tick = Instant::now();
    }
}

impl Drop for TerminalFrontend {
    fn drop(&mut self) {
        let _ = queue!(
            self.out,
            ResetColor,
            terminal::Clear(terminal::ClearType::All),
            cursor::Show,
            terminal::LeaveAlternateScreen
        );
        let _ = self.out.flush();
        let _ = terminal::disable_raw_mode();
    }
}

fn is_quit_key(key: &KeyEvent) -> bool {
    if key.kind == KeyEventKind::Release {
        return false;
    }
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Time between frames at `fps`, or `None` when no sensible period exists.
fn frame_period(fps: f64) -> Option<Duration> {
    if fps > 0.0 {
        Duration::try_from_secs_f64(1.0 / fps).ok()
    } else {
        None
    }
}

fn to_color(c: Rgb) -> Color {
    Color::Rgb {
        r: c.r,
        g: c.g,
        b: c.b,
    }
}

/// Map the pixel range `[start, end)` of an axis `extent` pixels long onto
/// `cells` cells. Non-empty ranges always cover at least one cell.
fn span(start: u32, end: u32, extent: u32, cells: u16) -> (u16, u16) {
    let cells_u = cells as u64;
    let scale = |px: u32| ((px.min(extent) as u64 * cells_u) / extent as u64) as u16;
    let a = scale(start).min(cells.saturating_sub(1));
    let b = scale(end).max(a + 1).min(cells);
    if end <= start || start >= extent {
        return (a, a);
    }
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_scales_onto_cells() {
        // 1024 px onto 128 cells: 8 px per cell
        assert_eq!(span(0, 8, 1024, 128), (0, 1));
        assert_eq!(span(558, 567, 1024, 128), (69, 70));
        assert_eq!(span(1016, 1024, 1024, 128), (127, 128));
    }

    #[test]
    fn test_span_never_loses_narrow_rects() {
        // A 9 px key on an 80-column terminal is under one cell wide
        let (a, b) = span(558, 567, 1024, 80);
        assert_eq!(b - a, 1);
    }

    #[test]
    fn test_span_clips_offscreen() {
        let (a, b) = span(2000, 2050, 1024, 80);
        assert_eq!(a, b);
        let (a, b) = span(1000, 1100, 1024, 80);
        assert!(b <= 80 && a < b);
    }

    #[test]
    fn test_frame_period_never_panics() {
        assert_eq!(frame_period(50.0), Some(Duration::from_millis(20)));
        assert_eq!(frame_period(0.0), None);
        assert_eq!(frame_period(-1.0), None);
        assert_eq!(frame_period(f64::NAN), None);
        // 1 / 1e-300 overflows Duration
        assert_eq!(frame_period(1e-300), None);
    }

    #[test]
    fn test_quit_keys() {
        let key = |code, mods| KeyEvent::new(code, mods);
        assert!(is_quit_key(&key(KeyCode::Esc, KeyModifiers::NONE)));
        assert!(is_quit_key(&key(KeyCode::Char('q'), KeyModifiers::NONE)));
        assert!(is_quit_key(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)));
        assert!(!is_quit_key(&key(KeyCode::Char('c'), KeyModifiers::NONE)));
        assert!(!is_quit_key(&key(KeyCode::Char(' '), KeyModifiers::NONE)));
    }
}
