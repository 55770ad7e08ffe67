//! Display blink used to identify the charger.

/// One step of the blink sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkStep {
    /// Light the display teal.
    Light,
    /// Switch the display off; counts one blink.
    Dark,
    /// Sequence finished, put the display back as the user wants it.
    Restore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentifyBlink {
    remaining: u16,
    lit: bool,
    active: bool,
}

impl IdentifyBlink {
    /// Begin (or restart) a sequence of `blinks` blinks.
    pub fn start(&mut self, blinks: u16) {
        self.remaining = blinks;
        self.lit = false;
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn remaining(&self) -> u16 {
        self.remaining
    }

    /// Advance the sequence. `None` once it has finished.
    pub fn step(&mut self) -> Option<BlinkStep> {
        if !self.active {
            return None;
        }
        if self.remaining == 0 {
            self.active = false;
            return Some(BlinkStep::Restore);
        }
        if self.lit {
            self.lit = false;
            self.remaining -= 1;
            Some(BlinkStep::Dark)
        } else {
            self.lit = true;
            Some(BlinkStep::Light)
        }
    }
}
