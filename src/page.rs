//! The alarm control page.
//!
//! [`render`] is pure: it takes the query string and the current alarm state and returns the
//! state the query asks for together with the page describing that state.

use core::fmt::Write;

use heapless::String;

use crate::{Error, Result};

pub const MAX_BODY_LEN: usize = 1500;

pub type PageBody = String<MAX_BODY_LEN>;

/// A command carried in the query string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmCommand {
    Activate,
    Deactivate,
}

impl AlarmCommand {
    /// Finds `alarm=on` or `alarm=off` anywhere in `query`. Other parameters are ignored.
    #[must_use]
    pub fn parse(query: &str) -> Option<Self> {
        if query.contains("alarm=on") {
            Some(Self::Activate)
        } else if query.contains("alarm=off") {
            Some(Self::Deactivate)
        } else {
            None
        }
    }
}

/// Result of rendering the page for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rendered {
    pub alarm_active: bool,
    pub body: PageBody,
}

/// Applies the command in `query` (if any) to `alarm_active` and renders the page for the
/// resulting state.
///
/// # Errors
///
/// Returns [`Error::BodyOverflow`] if the page does not fit in [`MAX_BODY_LEN`] bytes.
pub fn render(query: &str, alarm_active: bool) -> Result<Rendered> {
    let alarm_active = match AlarmCommand::parse(query) {
        Some(AlarmCommand::Activate) => true,
        Some(AlarmCommand::Deactivate) => false,
        None => alarm_active,
    };

    let (state, status, next, label) = if alarm_active {
        ("on", "LIGADO", "off", "Desligar")
    } else {
        ("off", "DESLIGADO", "on", "Ligar")
    };

    let mut body = PageBody::new();
    write!(
        body,
        "<html><head><title>Controle de Alarme</title>\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\
<meta charset=\"utf-8\"></head>\
<body><style>body{{font-family: Arial, sans-serif; text-align: center; margin-top: 50px;}} \
h1{{color: #333;}} p{{color: #555;}} \
.button {{display: inline-block; padding: 15px 25px; font-size: 20px; cursor: pointer; \
text-align: center; text-decoration: none; outline: none; color: #fff; \
border: none; border-radius: 15px; box-shadow: 0 9px #999;}} \
.button-on {{background-color: #4CAF50;}} .button-on:hover {{background-color: #3e8e41}} \
.button-off {{background-color: #f44336;}} .button-off:hover {{background-color: #da190b}} \
.status {{font-weight: bold; font-size: 22px;}} \
.status-on {{color: #f44336;}} .status-off {{color: #4CAF50;}}</style>\
<h1>Simulador Portatil de Alarme</h1>\
<p>Estado do Alarme: <strong class=\"status status-{state}\">{status}</strong></p>\
<p><a href=\"/?alarm={next}\" class=\"button button-{next}\">{label} Alarme</a></p>\
</body></html>"
    )
    .map_err(|_| Error::BodyOverflow)?;

    Ok(Rendered { alarm_active, body })
}
