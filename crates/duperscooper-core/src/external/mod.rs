//! Adapters over the two external executables audio decoding and DSP are
//! delegated to: the fingerprinter and the metadata probe. Both are
//! invoked synchronously via `std::process::Command`, matching the
//! synchronous, `rayon`-pool concurrency model the scanner uses —
//! suspension points are blocking, cancellation is cooperative.

mod fingerprinter;
mod probe;

pub use fingerprinter::Fingerprinter;
pub use probe::{MetadataProbe, ProbedMetadata};
