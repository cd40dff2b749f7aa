//! Range Service Adapter
//!
//! `GET {base}/bucket/range?asset=<id>&from=<low>&to=<high>&types=orders,stops&side=all&sort=lots&order=desc`

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::client::{RestClient, join_url};
use super::types::RangeResponse;
use crate::domain::instrument::InstrumentId;
use crate::domain::range::RangeSnapshot;
use crate::domain::slot::PriceBand;
use crate::ports::error::ApiError;
use crate::ports::range::RangeSource;

/// HTTP implementation of [`RangeSource`].
pub struct HttpRangeSource {
  client: Arc<RestClient>,
  base_url: String,
}

impl HttpRangeSource {
  pub fn new(client: Arc<RestClient>, base_url: impl Into<String>) -> Self {
    Self {
      client,
      base_url: base_url.into(),
    }
  }

  /// Full request URL for one lookup.
  pub fn range_url(&self, instrument: InstrumentId, band: &PriceBand) -> String {
    format!(
      "{}?asset={}&from={}&to={}&types=orders,stops&side=all&sort=lots&order=desc",
      join_url(&self.base_url, "bucket/range"),
      instrument,
      band.from.normalize(),
      band.to.normalize(),
    )
  }
}

#[async_trait]
impl RangeSource for HttpRangeSource {
  #[instrument(skip(self, band), fields(from = %band.from, to = %band.to))]
  async fn fetch_range(
    &self,
    instrument: InstrumentId,
    band: PriceBand,
  ) -> Result<RangeSnapshot, ApiError> {
    let url = self.range_url(instrument, &band);
    let response: RangeResponse = self.client.get_json(&url).await?;
    let snapshot = RangeSnapshot::classify(&response.items_orders, &response.items_stops);

    debug!(
      fills = snapshot.fill_ids.len(),
      sl = snapshot.stop_loss_ids.len(),
      tp = snapshot.take_profit_ids.len(),
      liq = snapshot.liquidation_ids.len(),
      "Range fetched"
    );

    Ok(snapshot)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::api::client::RestClientConfig;
  use rust_decimal_macros::dec;

  #[test]
  fn test_range_url_layout() {
    let client = Arc::new(RestClient::new(RestClientConfig::default()).unwrap());
    let source = HttpRangeSource::new(client, "https://api.example/");
    let band = PriceBand::around(dec!(50000), dec!(0.0002));

    assert_eq!(
      source.range_url(0, &band),
      "https://api.example/bucket/range?asset=0&from=49990&to=50010&types=orders,stops&side=all&sort=lots&order=desc"
    );
  }
}
