//! Range Source Port - Candidate Lookup Around a Price

use async_trait::async_trait;

use super::error::ApiError;
use crate::domain::instrument::InstrumentId;
use crate::domain::range::RangeSnapshot;
use crate::domain::slot::PriceBand;

/// Looks up resting items whose trigger lies inside a price band.
#[async_trait]
pub trait RangeSource: Send + Sync {
  /// Classified candidates for `instrument` within `band`.
  ///
  /// An error aborts the calling cycle; there is no partial result.
  async fn fetch_range(
    &self,
    instrument: InstrumentId,
    band: PriceBand,
  ) -> Result<RangeSnapshot, ApiError>;
}
