//! Attendance tokens and the acoustic channel that carries them.
//!
//! This crate is the leaf of the EchoMark stack. It knows nothing about
//! sessions or students; it only defines:
//!
//! - **Types** ([`SessionId`], [`StudentId`], [`DeviceId`], [`Timestamp`], ...)
//!   shared by every other crate.
//! - **Tokens** ([`Token`]): short-lived proofs of presence with a fixed
//!   32-byte wire form.
//! - **Codec** ([`TokenCodec`] trait, [`FskCodec`]): renders a token as a
//!   near-ultrasonic FSK [`AudioFrame`] and recovers it from captured audio.
//! - **Errors** ([`DecodeError`], [`ProtocolError`]).
//!
//! ```text
//! Token ──encode──▶ AudioFrame ──(speaker / air / microphone)──▶ AudioFrame ──decode──▶ Token
//! ```

mod codec;
mod crc;
mod error;
mod token;
mod types;

pub use codec::{CodecConfig, DATA_TONES, FskCodec, TokenCodec};
pub use crc::crc16;
pub use error::{DecodeError, ProtocolError};
pub use token::{AudioFrame, TOKEN_WIRE_LEN, Token};
pub use types::{ClassId, DeviceId, SessionId, StudentId, SubjectId, TeacherId, Timestamp};
