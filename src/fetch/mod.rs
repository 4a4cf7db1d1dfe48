// src/fetch/mod.rs

use anyhow::{bail, Context, Result};
use arrow::{
    compute::concat_batches,
    csv::{reader::Format, ReaderBuilder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use flate2::read::MultiGzDecoder;
use reqwest::Client;
use std::{
    borrow::Cow,
    io::{Cursor, Read},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, info, instrument};
use url::Url;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const BATCH_SIZE: usize = 64 * 1024;

/// Build the HTTP client used for downloads, with an optional per-request timeout.
pub fn http_client(timeout: Option<Duration>) -> Result<Client> {
    let mut builder = Client::builder();
    if let Some(t) = timeout {
        builder = builder.timeout(t);
    }
    builder.build().context("building HTTP client")
}

/// Download `url` and parse the (optionally gzip-compressed) CSV body into a
/// single record batch.
#[instrument(level = "info", skip(client))]
pub async fn fetch_dataset(client: &Client, url: &str) -> Result<RecordBatch> {
    let url = Url::parse(url).with_context(|| format!("parsing dataset URL {}", url))?;

    let resp = client
        .get(url.as_str())
        .send()
        .await
        .with_context(|| format!("GET {}", url))?
        .error_for_status()
        .with_context(|| format!("GET {}", url))?;
    let body = resp
        .bytes()
        .await
        .with_context(|| format!("reading body from {}", url))?;
    info!(bytes = body.len(), "downloaded");

    let batch = decode_csv(&body).with_context(|| format!("decoding CSV from {}", url))?;
    info!(
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        "parsed"
    );
    Ok(batch)
}

/// Parse a CSV document with a header row. Gzip input is detected by its
/// magic bytes; anything else is read as plain CSV. Column types are
/// inferred over every record, and all-empty columns come back as text.
pub fn decode_csv(body: &[u8]) -> Result<RecordBatch> {
    let data: Cow<'_, [u8]> = if body.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::new();
        MultiGzDecoder::new(body)
            .read_to_end(&mut out)
            .context("inflating gzip body")?;
        debug!(compressed = body.len(), inflated = out.len(), "gunzipped");
        Cow::Owned(out)
    } else {
        Cow::Borrowed(body)
    };

    if data.iter().all(u8::is_ascii_whitespace) {
        bail!("CSV body is empty");
    }

    let (inferred, _) = Format::default()
        .with_header(true)
        .infer_schema(Cursor::new(data.as_ref()), None)
        .context("inferring CSV schema")?;

    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|f| match f.data_type() {
            DataType::Null => Field::new(f.name(), DataType::Utf8, true),
            _ => f.as_ref().clone(),
        })
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_batch_size(BATCH_SIZE)
        .build(Cursor::new(data.as_ref()))
        .context("creating CSV reader")?;

    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .context("parsing CSV records")?;

    concat_batches(&schema, &batches).context("concatenating CSV batches")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{gzip, TestServer, SAMPLE_TRIPS_CSV};
    use arrow::array::{Array, Int64Array};
    use std::collections::HashMap;

    #[test]
    fn test_decode_gzip_csv() -> Result<()> {
        let batch = decode_csv(&gzip(SAMPLE_TRIPS_CSV.as_bytes()))?;
        assert_eq!(batch.num_rows(), 3);

        let schema = batch.schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names[0], "VendorID");
        assert!(names.contains(&"lpep_pickup_datetime"));
        assert!(names.contains(&"lpep_dropoff_datetime"));

        let vendor = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("VendorID should infer as Int64");
        assert_eq!(vendor.value(0), 2);
        assert!(vendor.is_null(2));

        // all-empty column is read as nullable text
        let ehail = schema.field_with_name("ehail_fee")?;
        assert_eq!(ehail.data_type(), &DataType::Utf8);
        Ok(())
    }

    #[test]
    fn test_decode_highly_compressed_csv() -> Result<()> {
        let mut csv = String::from("VendorID,fare_amount\n");
        for _ in 0..50_000 {
            csv.push_str("2,20.00\n");
        }
        let body = gzip(csv.as_bytes());
        // ratio far beyond the usual 4x
        assert!(body.len() * 20 < csv.len());

        let batch = decode_csv(&body)?;
        assert_eq!(batch.num_rows(), 50_000);
        Ok(())
    }

    #[test]
    fn test_decode_plain_csv() -> Result<()> {
        let batch = decode_csv(SAMPLE_TRIPS_CSV.as_bytes())?;
        assert_eq!(batch.num_rows(), 3);
        Ok(())
    }

    #[test]
    fn test_decode_header_only() -> Result<()> {
        let batch = decode_csv(b"a,b\n")?;
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 2);
        Ok(())
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(decode_csv(b"").is_err());
        assert!(decode_csv(&gzip(b"")).is_err());
        // gzip magic followed by garbage
        assert!(decode_csv(&[0x1f, 0x8b, 0x00, 0x01, 0x02]).is_err());
        // ragged rows
        assert!(decode_csv(b"a,b\n1,2\n3,4,5\n").is_err());
    }

    #[tokio::test]
    async fn test_fetch_dataset_over_http() -> Result<()> {
        let mut routes = HashMap::new();
        routes.insert(
            "/green/green_tripdata_2020-11.csv.gz".to_string(),
            gzip(SAMPLE_TRIPS_CSV.as_bytes()),
        );
        let server = TestServer::spawn(routes).await?;

        let client = http_client(Some(Duration::from_secs(5)))?;
        let url = format!("{}/green/green_tripdata_2020-11.csv.gz", server.base_url());
        let batch = fetch_dataset(&client, &url).await?;
        assert_eq!(batch.num_rows(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_dataset_non_success_status() -> Result<()> {
        let server = TestServer::spawn(HashMap::new()).await?;
        let client = http_client(None)?;
        let url = format!("{}/missing.csv.gz", server.base_url());
        let err = fetch_dataset(&client, &url).await.unwrap_err();
        assert!(format!("{:#}", err).contains("404"));
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_dataset_unreachable() -> Result<()> {
        let client = http_client(Some(Duration::from_secs(5)))?;
        let url = crate::test_support::unreachable_url().await?;
        assert!(fetch_dataset(&client, &url).await.is_err());
        assert!(fetch_dataset(&client, "not a url").await.is_err());
        Ok(())
    }
}
