// Shared fixtures for unit tests: a gzip helper, a tiny trip CSV and a
// one-route-per-path HTTP server.

use anyhow::Result;
use flate2::{write::GzEncoder, Compression};
use std::{collections::HashMap, io::Write, sync::Arc};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use warp::{http::StatusCode, path::FullPath, Filter};

pub const SAMPLE_TRIPS_CSV: &str = "\
VendorID,lpep_pickup_datetime,lpep_dropoff_datetime,store_and_fwd_flag,RatecodeID,PULocationID,DOLocationID,passenger_count,trip_distance,fare_amount,ehail_fee,total_amount,payment_type,trip_type
2,2020-11-01 00:08:23,2020-11-01 00:08:28,N,5,193,193,1,0.00,20.00,,20.00,1,2
2,2020-11-01 00:23:32,2020-11-01 00:38:25,N,1,74,238,1,3.39,13.00,,16.30,1,1
,2020-11-01 00:25:00,2020-11-01 00:57:00,,,196,36,,9.44,31.86,,33.61,,
";

pub fn init_test_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,taxi_etl=debug")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).expect("writing to an in-memory encoder");
    enc.finish().expect("finishing an in-memory encoder")
}

/// A URL on a port nothing listens on.
pub async fn unreachable_url() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{}/green/green_tripdata_2020-11.csv.gz", addr))
}

/// Serves each body in `routes` at its path with a 200, everything else 404.
pub struct TestServer {
    base_url: String,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn(routes: HashMap<String, Vec<u8>>) -> Result<Self> {
        let routes = Arc::new(routes);
        let files = warp::path::full().map(move |path: FullPath| {
            match routes.get(path.as_str()) {
                Some(body) => warp::reply::with_status(body.clone(), StatusCode::OK),
                None => warp::reply::with_status(b"not found".to_vec(), StatusCode::NOT_FOUND),
            }
        });

        let (addr, server) = warp::serve(files).try_bind_ephemeral(([127, 0, 0, 1], 0))?;
        let handle = tokio::spawn(server);

        Ok(Self {
            base_url: format!("http://{}", addr),
            handle,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
