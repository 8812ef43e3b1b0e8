//! Status text on the graphical boot screen.
//!
//! Every message goes to the log. When graphical boot is running and boot text
//! has not been turned off, it is also drawn in a small scroll region of the
//! boot screen so the user can see which SAN boot path was taken.

use core::fmt;

use tracing::info;

/// Size of the message buffer, including its terminator.
pub const BOOT_TEXT_MAX_LEN: usize = 128;

pub const BOOT_TEXT_COLOUR: u32 = 15;

/// Scroll region as `(left, top, right, bottom)`.
pub const BOOT_TEXT_AREA: (u32, u32, u32, u32) = (8, 14, 631, 111);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootTextConfig {
    /// False when the OS was started with the `NOGUIBOOT` load option.
    pub guiboot_enabled: bool,
    /// The `BootText` driver parameter.
    pub boot_text_enabled: bool,
}

impl Default for BootTextConfig {
    fn default() -> Self {
        Self {
            guiboot_enabled: true,
            boot_text_enabled: true,
        }
    }
}

impl BootTextConfig {
    pub fn display_enabled(&self) -> bool {
        self.guiboot_enabled && self.boot_text_enabled
    }
}

/// The boot video driver.
pub trait BootDisplay {
    /// Whether this driver currently owns the display.
    fn owns_display(&self) -> bool;
    fn acquire_display(&mut self);
    fn set_scroll_region(&mut self, left: u32, top: u32, right: u32, bottom: u32);
    fn set_text_colour(&mut self, colour: u32);
    fn display_string(&mut self, text: &str);
}

/// A display that draws nothing, for hosts without a boot screen.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl BootDisplay for NullDisplay {
    fn owns_display(&self) -> bool {
        true
    }

    fn acquire_display(&mut self) {}

    fn set_scroll_region(&mut self, _left: u32, _top: u32, _right: u32, _bottom: u32) {}

    fn set_text_colour(&mut self, _colour: u32) {}

    fn display_string(&mut self, _text: &str) {}
}

/// Records what would have been drawn.
#[derive(Debug, Default, Clone)]
pub struct RecordingDisplay {
    pub owned: bool,
    pub acquisitions: usize,
    pub scroll_region: Option<(u32, u32, u32, u32)>,
    pub scroll_region_calls: usize,
    pub colour: Option<u32>,
    pub text: Vec<String>,
}

impl BootDisplay for RecordingDisplay {
    fn owns_display(&self) -> bool {
        self.owned
    }

    fn acquire_display(&mut self) {
        self.owned = true;
        self.acquisitions += 1;
    }

    fn set_scroll_region(&mut self, left: u32, top: u32, right: u32, bottom: u32) {
        self.scroll_region = Some((left, top, right, bottom));
        self.scroll_region_calls += 1;
    }

    fn set_text_colour(&mut self, colour: u32) {
        self.colour = Some(colour);
    }

    fn display_string(&mut self, text: &str) {
        self.text.push(text.to_owned());
    }
}

/// Writes status messages to the log and, when enabled, the boot screen.
#[derive(Debug)]
pub struct BootText<D> {
    config: BootTextConfig,
    display: D,
    initialised: bool,
}

impl<D: BootDisplay> BootText<D> {
    pub fn new(config: BootTextConfig, display: D) -> Self {
        Self {
            config,
            display,
            initialised: false,
        }
    }

    pub fn config(&self) -> BootTextConfig {
        self.config
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn into_display(self) -> D {
        self.display
    }

    /// Print one message. Messages longer than the buffer are cut short.
    pub fn print(&mut self, message: impl fmt::Display) {
        let mut text = message.to_string();
        truncate_at_char_boundary(&mut text, BOOT_TEXT_MAX_LEN - 1);
        info!("{text}");

        if !self.config.display_enabled() {
            return;
        }
        if !self.display.owns_display() {
            self.display.acquire_display();
        }
        if !self.initialised {
            let (left, top, right, bottom) = BOOT_TEXT_AREA;
            self.display.set_scroll_region(left, top, right, bottom);
            self.initialised = true;
        }
        self.display.set_text_colour(BOOT_TEXT_COLOUR);
        self.display.display_string(&text);
    }
}

fn truncate_at_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_when_enabled() {
        let mut text = BootText::new(BootTextConfig::default(), RecordingDisplay::default());
        text.print("iSCSI boot via iPXE");
        text.print(format_args!("NIC {} target e{}.{}", "00:11:22:33:44:55", 1, 2));
        let display = text.into_display();
        assert_eq!(
            display.text,
            ["iSCSI boot via iPXE", "NIC 00:11:22:33:44:55 target e1.2"]
        );
        assert_eq!(display.scroll_region, Some((8, 14, 631, 111)));
        assert_eq!(display.scroll_region_calls, 1);
        assert_eq!(display.acquisitions, 1);
        assert_eq!(display.colour, Some(15));
    }

    #[test]
    fn noguiboot_suppresses_display() {
        let config = BootTextConfig {
            guiboot_enabled: false,
            boot_text_enabled: true,
        };
        let mut text = BootText::new(config, RecordingDisplay::default());
        text.print("AoE boot via iPXE");
        assert!(text.display().text.is_empty());
        assert_eq!(text.display().acquisitions, 0);
    }

    #[test]
    fn boot_text_parameter_suppresses_display() {
        let config = BootTextConfig {
            guiboot_enabled: true,
            boot_text_enabled: false,
        };
        let mut text = BootText::new(config, RecordingDisplay::default());
        text.print("SRP boot via iPXE");
        assert!(text.display().text.is_empty());
    }

    #[test]
    fn long_messages_are_truncated() {
        let mut text = BootText::new(BootTextConfig::default(), RecordingDisplay::default());
        text.print("x".repeat(500));
        text.print("é".repeat(100));
        let display = text.into_display();
        assert_eq!(display.text[0].len(), BOOT_TEXT_MAX_LEN - 1);
        assert!(display.text[1].len() < BOOT_TEXT_MAX_LEN);
        assert!(display.text[1].chars().all(|c| c == 'é'));
    }
}
