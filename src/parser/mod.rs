//! Archive parsing: streaming MBOX reader, header decoding, MIME extraction,
//! and Google Chat timestamp recovery.

pub mod chat;
pub mod header;
pub mod mbox;
pub mod mime;
