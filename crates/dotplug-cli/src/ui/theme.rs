//! Icons, colours and column widths shared by every renderer.

use crossterm::style::Color;

#[derive(Debug, Clone, Copy)]
pub struct Icons {
    pub pending: &'static str,
    pub active: &'static str,
    pub success: &'static str,
    pub warning: &'static str,
    pub error: &'static str,
    pub info: &'static str,
}

impl Default for Icons {
    fn default() -> Self {
        Self {
            pending: "○",
            active: "●",
            success: "✓",
            warning: "!",
            error: "✗",
            info: "·",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Colors {
    pub app_name: Color,
    pub version: Color,
    pub secondary: Color,
    pub active: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
}

impl Default for Colors {
    fn default() -> Self {
        Self {
            app_name: Color::Reset,
            version: Color::DarkGrey,
            secondary: Color::DarkGrey,
            active: Color::Cyan,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Layout {
    /// Width of the icon + name column.
    pub name_width: usize,
    pub version_width: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            name_width: 28,
            version_width: 14,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Theme {
    pub icons: Icons,
    pub colors: Colors,
    pub layout: Layout,
}
