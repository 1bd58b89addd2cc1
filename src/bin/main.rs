// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::net::TcpListener;
use tour_booking_rs::{Config, Destination, Engine, Store, Tour, TourAvailability, User, server};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Tour booking API server
///
/// Serves the booking, payment and webhook endpoints. Payment providers are
/// enabled by their environment variables (e.g. `PAYSTACK_SECRET_KEY`); a
/// `.env` file in the working directory is loaded first.
#[derive(Parser, Debug)]
#[command(name = "tour-booking")]
#[command(about = "Tour booking and payment reconciliation service", long_about = None)]
struct Args {
    /// JSON catalog to load at startup
    ///
    /// Expected shape: {"users": [...], "destinations": [...], "tours": [...],
    /// "availabilities": [...]}, decimal amounts as strings.
    #[arg(long, value_name = "FILE")]
    seed: Option<PathBuf>,

    /// Address to bind (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides PORT)
    #[arg(long)]
    port: Option<u16>,
}

/// Catalog loaded with `--seed`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Seed {
    users: Vec<User>,
    destinations: Vec<Destination>,
    tours: Vec<Tour>,
    availabilities: Vec<TourAvailability>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store = Arc::new(Store::new());
    if let Some(path) = &args.seed {
        if let Err(e) = load_seed(&store, path) {
            error!(path = %path.display(), error = %e, "failed to load seed catalog");
            process::exit(1);
        }
    }

    let engine = Arc::new(Engine::from_config(&config, store));
    info!(providers = ?engine.gateways().providers(), "payment providers configured");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind");
            process::exit(1);
        }
    };
    if let Err(e) = server::serve(listener, engine).await {
        error!(error = %e, "server stopped");
        process::exit(1);
    }
}

/// Loads a JSON catalog into `store`, parents before children.
fn load_seed(store: &Store, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let seed: Seed = serde_json::from_str(&fs::read_to_string(path)?)?;
    let counts = (
        seed.users.len(),
        seed.destinations.len(),
        seed.tours.len(),
        seed.availabilities.len(),
    );
    for user in seed.users {
        store.insert_user(user);
    }
    for destination in seed.destinations {
        store.insert_destination(destination);
    }
    for tour in seed.tours {
        store.insert_tour(tour)?;
    }
    for availability in seed.availabilities {
        store.insert_availability(availability)?;
    }
    info!(
        users = counts.0,
        destinations = counts.1,
        tours = counts.2,
        availabilities = counts.3,
        "seed catalog loaded"
    );
    Ok(())
}
