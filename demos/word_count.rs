// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

//! Word count over stdin, surviving restarts through an on-disk changelog.
//!
//! ```text
//! echo "hello kafka streams" | cargo run --example word_count -- /tmp/word-count-state
//! ```

use sketch_state_store::*;
use std::io::{self, BufRead};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const STORE_NAME: &str = "word-counts";

fn main() -> Result<(), StoreError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sketch_state_store=info,word_count=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let state_dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "word-count-state".to_string());
    let config = match std::env::var("WORD_COUNT_CONFIG") {
        Ok(json) => StoreConfig::from_json(&json)?,
        Err(_) => StoreConfig::default(),
    };

    let log = FileLog::open(&state_dir, STORE_NAME)?;
    let mut store = CountMinStore::open(STORE_NAME, &config, log)?;
    if store.state() == StoreState::Restoring {
        store.restore_from_log(Some(Duration::from_secs(30)))?;
    }

    let mut transformer = CountTransformer::new();
    transformer.init(&mut store)?;

    for line in io::stdin().lock().lines() {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        for (word, count) in transformer.process_line(None, &line?, timestamp)? {
            println!("{}\t{}", word, count);
        }
    }
    transformer.close();

    tracing::info!(
        total = store.total_count(),
        error_bound = store.error_bound(),
        "word count finished"
    );
    store.close()
}
