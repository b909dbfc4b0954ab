pub mod ghostscript;
pub mod types;

use anyhow::Result;

pub use types::{
    CompressRequest, CompressionAttempt, Credential, EngineDiag, Outcome, QualityPreset,
};

/// One external rendering backend.
///
/// `compress` reports engine-level problems through the returned attempt and
/// never fails; only environment problems surface as errors (`doctor`).
pub trait Engine {
    fn doctor(&self) -> Result<EngineDiag>;
    fn compress(&self, req: &CompressRequest<'_>) -> CompressionAttempt;
}

impl<E: Engine + ?Sized> Engine for &E {
    fn doctor(&self) -> Result<EngineDiag> {
        (**self).doctor()
    }

    fn compress(&self, req: &CompressRequest<'_>) -> CompressionAttempt {
        (**self).compress(req)
    }
}
