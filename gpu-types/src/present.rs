/// Presentation policy requested of the swapchain manager (C9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum PresentMode {
    /// `VK_PRESENT_MODE_FIFO_KHR`. Always supported.
    Vsync = 0,
    /// `VK_PRESENT_MODE_IMMEDIATE_KHR`. May tear.
    Immediate,
    /// `VK_PRESENT_MODE_MAILBOX_KHR`. Bumps the swapchain image count to 3.
    Mailbox,
}

impl Default for PresentMode {
    fn default() -> Self {
        PresentMode::Vsync
    }
}

/// Color space + encoding the swapchain is composited in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SwapchainComposition {
    Sdr = 0,
    SdrLinear,
    HdrExtendedLinear,
    Hdr10St2084,
}

impl Default for SwapchainComposition {
    fn default() -> Self {
        SwapchainComposition::Sdr
    }
}
