//! Message framing and record encoding for bowwire.
//!
//! Two layers, used in sequence:
//!
//! - **Framing** carries opaque payloads over a byte stream, each one
//!   preceded by a 4-byte big-endian length.
//! - **Schema** checks a [`Record`] against a grammar and turns it into
//!   zlib-compressed canonical JSON, and back.
//!
//! ```text
//! Record --verify/encode--> payload --send_message--> stream
//! stream --read_message--> payload --decode--> Record
//! ```
//!
//! The layers hold no state; any number of streams can be served
//! concurrently. A single stream must not be read (or written) by two tasks
//! at once.
//!
//! # Example
//!
//! ```rust
//! use bowwire_protocol::{GrammarRules, Record, decode, encode, encode_frame, decode_frame};
//! use serde_json::json;
//!
//! let rules = GrammarRules::default().require("channel");
//! let record: Record = serde_json::from_value(json!({"channel": "/queue/x", "seq": 1})).unwrap();
//!
//! let frame = encode_frame(&encode(&record, &rules).unwrap()).unwrap();
//! let (payload, _) = decode_frame(&frame).unwrap();
//! assert_eq!(decode(payload, &rules).unwrap(), record);
//! ```

pub mod blocking;
mod error;
mod framing;
mod grammar;
mod schema;

pub use error::{FrameStage, ProtocolError, ProtocolResult};
pub use framing::{
    MAX_PAYLOAD_LEN, PREFIX_LEN, decode_frame, encode_frame, length_prefix, read_message,
    read_message_limited, send_message,
};
pub use grammar::{
    AcceptAll, DEFAULT_MAX_DEPTH, FieldType, GrammarRules, MAX_NESTING_DEPTH, ROOT_PATH, Validator,
    Violation, ViolationKind, check_depth, lookup,
};
pub use schema::{
    MAX_DECODED_SIZE, canonical_text, decode, decode_limited, encode, read_record, send_record,
    verify,
};

pub use serde_json::Value;

/// A structured message: string keys mapped to JSON values.
pub type Record = serde_json::Map<String, Value>;
