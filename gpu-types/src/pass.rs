/// What happens to an attachment's existing contents at the start of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum LoadOp {
    Load = 0,
    Clear,
    DontCare,
}

impl Default for LoadOp {
    fn default() -> Self {
        LoadOp::Load
    }
}

/// What happens to an attachment's contents at the end of a pass.
///
/// `Resolve` and `ResolveAndStore` both require a multisampled attachment
/// paired with a single-sampled resolve target; the render-pass cache (C5)
/// adds a resolve attachment to the subpass for either one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum StoreOp {
    Store = 0,
    DontCare,
    Resolve,
    ResolveAndStore,
}

impl Default for StoreOp {
    fn default() -> Self {
        StoreOp::Store
    }
}

impl StoreOp {
    pub const fn needs_resolve_attachment(self) -> bool {
        matches!(self, StoreOp::Resolve | StoreOp::ResolveAndStore)
    }
}

bitflags::bitflags! {
    /// Which of load/store actually touch memory, used as part of the
    /// render-pass attachment key (C5) and the `AttachmentOps` component of
    /// barrier bookkeeping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AttachmentOps: u8 {
        const LOAD  = 1 << 0;
        const STORE = 1 << 1;
    }
}
