//! Core types shared by the audit engine: the audit lifecycle, the page
//! extraction record, and the score/query reports derived from it.

mod audit;
mod error;
mod extract;
mod report;

pub use audit::*;
pub use error::CoreError;
pub use extract::*;
pub use report::*;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }
}
