//! Alarm state and the output policy that follows it.
//!
//! The HTTP side only flips an [`AlarmSwitch`]. The supervisor owns the LEDs, the buzzer and
//! the OLED, and [`AlarmPolicy::pump`] brings them in line with the switch on every iteration.

use portable_atomic::{AtomicBool, Ordering};

use crate::Result;
use crate::shared_constants::BLINK_MS;

/// Digital outputs driven by the alarm policy.
///
/// Every call must complete in bounded time.
pub trait AlarmOutputs {
    fn set_red(&mut self, on: bool);
    fn set_green(&mut self, on: bool);
    /// Onboard "AP active" indicator.
    fn set_blue(&mut self, on: bool);
    fn set_buzzer(&mut self, on: bool);
}

/// The status screen.
///
/// Implementations may block for the duration of one display transfer.
pub trait StatusDisplay {
    /// "EVACUAR" when `active`, otherwise "Sistema em" / "repouso".
    ///
    /// # Errors
    ///
    /// Returns an error if the display could not be updated.
    fn show_status(&mut self, active: bool) -> Result<()>;

    /// The farewell screen shown once the access point is down.
    ///
    /// # Errors
    ///
    /// Returns an error if the display could not be updated.
    fn show_ap_disabled(&mut self) -> Result<()>;
}

/// The `alarm_active` flag, written by page requests and read by the supervisor.
pub struct AlarmSwitch {
    active: AtomicBool,
}

impl AlarmSwitch {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stores `active` and reports whether the value changed.
    pub fn set(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::AcqRel) != active
    }
}

impl Default for AlarmSwitch {
    fn default() -> Self {
        Self::new()
    }
}

/// Supervisor-side view of the alarm: what the outputs currently show and where the blink is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AlarmPolicy {
    shown_active: bool,
    blink_phase: bool,
    last_toggle_ms: u64,
}

impl AlarmPolicy {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            shown_active: false,
            blink_phase: false,
            last_toggle_ms: 0,
        }
    }

    /// Puts the outputs in the idle state: green on, red and buzzer off, blue following
    /// `ap_running`.
    pub fn apply_idle(&mut self, outputs: &mut impl AlarmOutputs, ap_running: bool) {
        *self = Self::new();
        outputs.set_green(true);
        outputs.set_red(false);
        outputs.set_buzzer(false);
        outputs.set_blue(ap_running);
    }

    /// Follows `active`: handles transitions, then advances the blink.
    ///
    /// # Errors
    ///
    /// Returns the display's error if a transition could not be shown. The outputs are updated
    /// regardless.
    pub fn pump(
        &mut self,
        now_ms: u64,
        active: bool,
        outputs: &mut impl AlarmOutputs,
        display: &mut impl StatusDisplay,
    ) -> Result<()> {
        let mut shown = Ok(());
        if active != self.shown_active {
            self.shown_active = active;
            self.blink_phase = false;
            if active {
                #[cfg(feature = "defmt")]
                defmt::info!("Alarm activated");
                outputs.set_green(false);
                self.last_toggle_ms = now_ms;
            } else {
                #[cfg(feature = "defmt")]
                defmt::info!("Alarm deactivated");
                outputs.set_red(false);
                outputs.set_buzzer(false);
                outputs.set_green(true);
            }
            shown = display.show_status(active);
        }

        if self.shown_active && now_ms.saturating_sub(self.last_toggle_ms) >= BLINK_MS {
            self.blink_phase = !self.blink_phase;
            self.last_toggle_ms = now_ms;
            outputs.set_red(self.blink_phase);
            outputs.set_buzzer(self.blink_phase);
        }
        shown
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.shown_active
    }

    #[must_use]
    pub const fn blink_phase(&self) -> bool {
        self.blink_phase
    }
}

/// Red, green and buzzer off. Blue is left to whoever tracks the access point.
pub fn shutdown_outputs(outputs: &mut impl AlarmOutputs) {
    outputs.set_red(false);
    outputs.set_buzzer(false);
    outputs.set_green(false);
}
