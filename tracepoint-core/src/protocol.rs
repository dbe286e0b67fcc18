//! The wire-protocol choice, as far as the core needs to know it. The actual
//! codec (legacy framed text vs. DAP-style JSON) lives entirely outside this
//! crate; the core only needs to know which one is currently selected so it
//! can refuse to switch mid-session and so the façade can report it back.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Legacy,
    Dap,
}
