//! Table Rendering
//!
//! One row per application, reserved up front in manifest order. On a
//! terminal the rows are redrawn in place through a [`RelativeFrame`];
//! otherwise each row is printed once, when it reaches a final state.

use super::engine::RelativeFrame;
use super::progress::{ProgressIndicator, format_download_progress, format_size};
use super::theme::Theme;
use crossterm::style::{Color, Stylize};
use std::io::Write;

/// What a row currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowState {
    Pending,
    /// Working; the label names the current step.
    Active { label: String },
    Downloading { current: u64, total: Option<u64> },
    Done { detail: String, size: Option<u64> },
    Failed { reason: String },
}

impl RowState {
    fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. } | Self::Downloading { .. })
    }

    fn is_final(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed { .. })
    }
}

#[derive(Debug, Clone)]
struct Row {
    name: String,
    version: String,
    state: RowState,
}

/// Message severity for footer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Error,
}

#[derive(Debug)]
pub struct TableRenderer {
    rows: Vec<Row>,
    theme: Theme,
    live: bool,
    progress: ProgressIndicator,
    frame: Option<RelativeFrame>,
}

impl TableRenderer {
    pub fn new(theme: Theme, live: bool) -> Self {
        Self {
            rows: Vec::new(),
            theme,
            live,
            progress: ProgressIndicator::new(theme.icons),
            frame: None,
        }
    }

    /// Reserve a row per application.
    pub fn prepare(&mut self, items: &[(String, String)]) {
        self.rows = items
            .iter()
            .map(|(name, version)| Row {
                name: name.clone(),
                version: version.clone(),
                state: RowState::Pending,
            })
            .collect();

        if self.live && !self.rows.is_empty() {
            println!();
            let mut frame = RelativeFrame::new(self.rows.len() as u16);
            let _ = frame.start();
            self.frame = Some(frame);
            self.render_all();
        }
    }

    /// Change a row's state. Final states are sticky.
    pub fn update(&mut self, name: &str, state: RowState) {
        let Some(idx) = self.rows.iter().position(|r| r.name == name) else {
            return;
        };
        if self.rows[idx].state.is_final() {
            return;
        }
        let became_final = state.is_final();
        self.rows[idx].state = state;

        if self.frame.is_some() {
            self.render_row(idx);
            self.flush();
        } else if became_final {
            println!("{}", self.format_row(idx, self.theme.icons.pending));
        }
    }

    /// Redraw rows whose icon blinks.
    pub fn tick(&mut self) {
        if self.frame.is_none() {
            return;
        }
        let active: Vec<usize> = (0..self.rows.len())
            .filter(|&i| self.rows[i].state.is_active())
            .collect();
        if active.is_empty() {
            return;
        }
        for idx in active {
            self.render_row(idx);
        }
        self.flush();
    }

    pub fn render_all(&mut self) {
        for idx in 0..self.rows.len() {
            self.render_row(idx);
        }
        self.flush();
    }

    fn render_row(&mut self, idx: usize) {
        let line = self.format_row(idx, self.progress.current_icon());
        if let Some(frame) = self.frame.as_mut() {
            let _ = frame.write_row(idx as u16, |out| write!(out, "{line}"));
        }
    }

    fn flush(&mut self) {
        if let Some(frame) = self.frame.as_mut() {
            let _ = frame.flush();
        }
    }

    fn format_row(&self, idx: usize, active_icon: &str) -> String {
        let row = &self.rows[idx];
        let theme = &self.theme;
        let colors = theme.colors;

        let (icon, color, status) = match &row.state {
            RowState::Pending => (theme.icons.pending, colors.secondary, "pending".to_string()),
            RowState::Active { label } => (active_icon, colors.active, format!("{label}...")),
            RowState::Downloading { current, total } => (
                active_icon,
                colors.active,
                format_download_progress(*current, *total),
            ),
            RowState::Done { detail, size } => {
                let status = match size {
                    Some(bytes) => format!("{detail} ({})", format_size(*bytes)),
                    None => detail.clone(),
                };
                (theme.icons.success, colors.success, status)
            }
            RowState::Failed { reason } => {
                (theme.icons.error, colors.error, format!("FAILED: {reason}"))
            }
        };

        let name = format!("  {icon} {}", row.name);
        let name = format!("{name: <width$}", width = theme.layout.name_width);
        let version = format!("{: <width$}", row.version, width = theme.layout.version_width);
        format!(
            "{} {} {}",
            name.with(name_color(&row.state, colors.app_name, color)),
            version.with(colors.version),
            status.with(color)
        )
    }

    /// Close the frame and print a footer line below it.
    pub fn print_footer(&mut self, message: &str, severity: Severity) {
        self.close();
        let icons = self.theme.icons;
        match severity {
            Severity::Success => println!("{} {}", icons.success.green(), message.green()),
            Severity::Warning => println!("{} {}", icons.warning.yellow(), message.yellow()),
            Severity::Error => println!("{} {}", icons.error.red(), message.red()),
        }
    }

    pub fn close(&mut self) {
        if let Some(mut frame) = self.frame.take() {
            let _ = frame.finish();
            println!();
        }
    }
}

fn name_color(state: &RowState, default: Color, status: Color) -> Color {
    match state {
        RowState::Failed { .. } => status,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableRenderer {
        let mut table = TableRenderer::new(Theme::default(), false);
        table.prepare(&[("foo".into(), "1.0".into()), ("bar".into(), "2.0".into())]);
        table
    }

    #[test]
    fn test_final_state_is_sticky() {
        let mut table = table();
        table.update(
            "foo",
            RowState::Done {
                detail: "installed".into(),
                size: None,
            },
        );
        table.update("foo", RowState::Active { label: "linking".into() });
        assert!(matches!(table.rows[0].state, RowState::Done { .. }));
    }

    #[test]
    fn test_unknown_rows_are_ignored() {
        let mut table = table();
        table.update("nope", RowState::Active { label: "x".into() });
        assert!(table.rows.iter().all(|r| r.state == RowState::Pending));
    }

    #[test]
    fn test_row_text() {
        let mut table = table();
        table.rows[1].state = RowState::Failed {
            reason: "boom".into(),
        };
        let line = table.format_row(1, "*");
        assert!(line.contains("bar"));
        assert!(line.contains("2.0"));
        assert!(line.contains("FAILED: boom"));
    }
}
