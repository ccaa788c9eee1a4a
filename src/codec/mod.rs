//! Media encoding and decoding
//!
//! Turns local files into the base64 transfer representation the remote
//! service expects, and turns raw speech payloads into playable samples.

pub mod asset;
pub mod audio;
pub mod mime;

pub use asset::{encode, encode_all};
pub use audio::{decode_audio, decode_audio_base64, SampleBuffer, CHANNELS, SAMPLE_RATE};
pub use mime::{detect_image_mime, mime_for_path};
