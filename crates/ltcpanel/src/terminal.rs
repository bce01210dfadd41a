//! Terminal rendition of the timecode mirror.
//!
//! The engine pushes into a [`SharedDisplay`]; a render task polls it at
//! roughly the frame rate and redraws the top line of the terminal (and the
//! window title) only when something changed.

use std::io::{self, stdout, Write};
use std::time::Duration;

use crossterm::{
    cursor, queue,
    style::{Attribute, Print, SetAttribute},
    terminal::{Clear, ClearType, SetTitle},
};
use ltcpanel_core::{DisplayState, SharedDisplay};
use tokio::task::JoinHandle;

const REDRAW_INTERVAL: Duration = Duration::from_millis(33);

pub fn format_mirror(state: &DisplayState) -> String {
    format!("[ {} ]  {}", state.timecode, state.status)
}

/// A running mirror; dropping it leaves the last frame on screen.
pub struct TerminalMirror {
    display: SharedDisplay,
    render: JoinHandle<()>,
}

impl TerminalMirror {
    pub fn spawn() -> Self {
        let display = SharedDisplay::new();
        let render = tokio::spawn(render_loop(display.clone()));
        Self { display, render }
    }

    /// The sink to attach to the engine.
    pub fn sink(&self) -> SharedDisplay {
        self.display.clone()
    }

    pub fn close(self) {
        self.render.abort();
        if let Err(e) = clear(&mut stdout()) {
            log::warn!("Failed to clear mirror: {}", e);
        }
    }
}

async fn render_loop(display: SharedDisplay) {
    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);
    let mut drawn = None;

    loop {
        redraw.tick().await;

        let state = display.state();
        if drawn == Some(state.updates) {
            continue;
        }

        if let Err(e) = draw(&mut stdout(), &state) {
            log::warn!("Mirror render failed: {}", e);
            return;
        }
        drawn = Some(state.updates);
    }
}

fn draw(out: &mut impl Write, state: &DisplayState) -> io::Result<()> {
    let line = format_mirror(state);
    queue!(
        out,
        SetTitle(&line),
        cursor::SavePosition,
        cursor::MoveTo(0, 0),
        Clear(ClearType::CurrentLine),
        SetAttribute(Attribute::Bold),
        Print(&line),
        SetAttribute(Attribute::Reset),
        cursor::RestorePosition,
    )?;
    out.flush()
}

fn clear(out: &mut impl Write) -> io::Result<()> {
    queue!(
        out,
        SetTitle("ltcpanel"),
        cursor::SavePosition,
        cursor::MoveTo(0, 0),
        Clear(ClearType::CurrentLine),
        cursor::RestorePosition,
    )?;
    out.flush()
}
