//! Terminal Engine - Relative positioning for real-time UIs
//!
//! The frame prints N blank lines, moves back up and saves that position as
//! its anchor. Every row write restores the anchor and moves down relative to
//! it, so the table never needs absolute screen coordinates.

use crossterm::{
    QueueableCommand,
    cursor::{Hide, MoveDown, MoveToColumn, MoveUp, RestorePosition, SavePosition, Show},
    terminal::{Clear, ClearType},
};
use std::io::{Result, Stdout, Write, stdout};

#[derive(Debug)]
pub struct RelativeFrame {
    stdout: Stdout,
    rows: u16,
    started: bool,
}

impl RelativeFrame {
    pub fn new(rows: u16) -> Self {
        Self {
            stdout: stdout(),
            rows,
            started: false,
        }
    }

    /// Reserve the frame's lines and anchor at its first row.
    pub fn start(&mut self) -> Result<()> {
        for _ in 0..self.rows {
            writeln!(self.stdout)?;
        }
        if self.rows > 0 {
            self.stdout.queue(MoveUp(self.rows))?;
        }
        self.stdout.queue(MoveToColumn(0))?;
        self.stdout.queue(SavePosition)?;
        self.stdout.queue(Hide)?;
        self.stdout.flush()?;
        self.started = true;
        Ok(())
    }

    /// Redraw row `idx`. Output is queued until [`RelativeFrame::flush`].
    pub fn write_row(&mut self, idx: u16, f: impl FnOnce(&mut Stdout) -> Result<()>) -> Result<()> {
        if !self.started {
            self.start()?;
        }
        if idx >= self.rows {
            return Ok(());
        }

        self.stdout.queue(RestorePosition)?;
        if idx > 0 {
            self.stdout.queue(MoveDown(idx))?;
        }
        self.stdout.queue(MoveToColumn(0))?;
        f(&mut self.stdout)?;
        // Clearing after the write avoids a visible blank flash.
        self.stdout.queue(Clear(ClearType::UntilNewLine))?;
        self.stdout.queue(RestorePosition)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.stdout.flush()
    }

    /// Leave the cursor below the frame.
    pub fn finish(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        self.stdout.queue(RestorePosition)?;
        if self.rows > 0 {
            self.stdout.queue(MoveDown(self.rows))?;
        }
        self.stdout.queue(MoveToColumn(0))?;
        self.stdout.queue(Show)?;
        self.stdout.flush()?;
        self.started = false;
        Ok(())
    }
}

impl Drop for RelativeFrame {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}
