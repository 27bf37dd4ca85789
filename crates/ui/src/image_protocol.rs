//! Terminal graphics detection for the page reader.

use std::time::Duration;

use ratatui_image::picker::{Capability, Picker, ProtocolType, cap_parser::QueryStdioOptions};

/// What the environment says about the terminal we are drawing into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TerminalHint {
    Kitty,
    Iterm,
    Tmux,
    Plain,
}

impl TerminalHint {
    pub(crate) fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).unwrap_or_default();
        let kitty_window = !var("KITTY_WINDOW_ID").trim().is_empty();
        // `KITTY_WINDOW_ID` is not forwarded over SSH, `TERM` is.
        let kitty_term = var("TERM").trim().starts_with("xterm-kitty");
        let iterm = !var("ITERM_SESSION_ID").trim().is_empty()
            || var("TERM_PROGRAM").contains("iTerm")
            || var("LC_TERMINAL").contains("iTerm");

        if iterm {
            TerminalHint::Iterm
        } else if kitty_window || kitty_term {
            TerminalHint::Kitty
        } else if std::env::var_os("TMUX").is_some() {
            TerminalHint::Tmux
        } else {
            TerminalHint::Plain
        }
    }

    /// Plain terminals are not queried so startup never stalls.
    pub(crate) fn query_timeout(self) -> Option<Duration> {
        match self {
            TerminalHint::Kitty | TerminalHint::Iterm => Some(Duration::from_millis(1500)),
            TerminalHint::Tmux => Some(Duration::from_millis(300)),
            TerminalHint::Plain => None,
        }
    }
}

pub(crate) fn ensure_tmux_allow_passthrough() {
    if std::env::var_os("TMUX").is_none() {
        return;
    }

    // Needed for kitty graphics inside tmux; old tmux versions just refuse.
    let _ = std::process::Command::new("tmux")
        .args(["set-option", "-g", "allow-passthrough", "on"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status();
}

/// Builds the picker used for page images. Falls back to halfblocks when the
/// terminal does not answer.
pub(crate) fn build_picker(hint: TerminalHint) -> Picker {
    let mut picker = match hint.query_timeout() {
        Some(timeout) => {
            let options = QueryStdioOptions {
                timeout,
                text_sizing_protocol: false,
            };
            Picker::from_query_stdio_with_options(options).unwrap_or_else(|err| {
                tracing::debug!(error = %err, "terminal graphics query failed");
                Picker::halfblocks()
            })
        }
        None => Picker::halfblocks(),
    };
    picker.set_background_color(image::Rgba([0u8, 0u8, 0u8, 255u8]));
    prefer_kitty(&mut picker, hint);
    picker
}

fn prefer_kitty(picker: &mut Picker, hint: TerminalHint) -> bool {
    let capable = match hint {
        TerminalHint::Iterm => false,
        TerminalHint::Kitty => true,
        TerminalHint::Tmux | TerminalHint::Plain => picker
            .capabilities()
            .iter()
            .any(|cap| matches!(cap, Capability::Kitty)),
    };
    if capable {
        picker.set_protocol_type(ProtocolType::Kitty);
    }
    capable
}

pub(crate) fn protocol_label(picker: &Picker) -> &'static str {
    match picker.protocol_type() {
        ProtocolType::Halfblocks => "halfblocks",
        ProtocolType::Sixel => "sixel",
        ProtocolType::Kitty => "kitty",
        ProtocolType::Iterm2 => "iterm2",
    }
}
