//! Pipeline stages for agent-driven PDF highlighting.
//!
//! ## Data Flow
//!
//! ```text
//! document ──▶ orchestrator ──▶ highlight ──▶ render
//! (bytes)      (agent loop)     (records)     (plan + pdfium)
//!                  │                            │
//!             conversation                   coords
//! ```
//!
//! 1. [`document`]: validate the payload and inspect page sizes once
//! 2. [`conversation`]: provider-neutral turns and the transport trait
//! 3. [`orchestrator`]: the state machine that runs the agent to completion
//! 4. [`highlight`]: tool-call validation and the ordered accumulator
//! 5. [`coords`]: pure canvas → page coordinate mapping
//! 6. [`render`]: pure draw plan, executed by a [`render::DocumentEngine`]
//!    inside `spawn_blocking`

pub mod conversation;
pub mod coords;
pub mod document;
pub mod highlight;
pub mod orchestrator;
pub mod render;
