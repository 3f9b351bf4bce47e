//! # VectorLink Codec
//!
//! ## Purpose
//!
//! The "rules" layer of the link: how a payload becomes bytes on the wire and
//! how an unbounded byte stream becomes discrete frames again.
//!
//! - Frame packing (`"<length>SEQ<seq>:" + payload`)
//! - Stream reassembly over an accumulating buffer
//! - Sequence integrity tracking and the shared send counter
//! - Vector payload serialization
//!
//! ## What This Crate Does NOT Contain
//! - Socket management or connection handling (belongs in network/)
//! - Configuration or service wiring
//!
//! ## Architecture Role
//!
//! ```text
//! [codec] → network/ → services/
//!   ↑          ↓           ↓
//! Framing   Sockets    Generator
//! Sequence  Retry      Analyser
//! ```

pub mod error;
pub mod frame;
pub mod payload;
pub mod sequence;

pub use error::{CodecError, CodecResult};
pub use frame::{
    pack, pack_into, try_parse, try_parse_with_limit, Frame, FrameParser,
    DEFAULT_MAX_FRAME_LEN, HEADER_DELIMITER, MAX_HEADER_LEN, SEQ_SEPARATOR,
};
pub use payload::{decode_vector, encode_vector};
pub use sequence::{SequenceCounter, SequenceTracker, VerifyOutcome};
