//! EDF container support: header codec, reader, continuous writer.
//!
//! Only the subset of EDF/EDF+ needed by the conditioning pipeline is
//! implemented: 16-bit signals, continuous and discontinuous layouts on
//! read, continuous EDF+C on write, TAL annotation parsing.

pub mod header;
pub mod reader;
pub mod writer;

pub use header::{EdfHeader, SignalHeader, ANNOTATION_LABEL};
pub use reader::{EdfReader, TalAnnotation};
pub use writer::write_continuous;
