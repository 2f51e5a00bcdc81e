/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

mod bus;
mod config;
mod providers;
mod store;

use crate::bus::{BusReplySink, BusServer};
use crate::config::Config;
use crate::providers::simulated::SimulatedProvider;
use crate::store::JsonFixStore;
use clap::Parser;
use loc_fusion::{FusionEngine, ProviderSet};
use std::fs::File;
use std::io::Read;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(about = "On-device location-fusion daemon")]
struct DaemonArgs {
    #[arg(short, long, value_name = "FILE")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt::try_init();

    info!("Started loc-fusion-daemon");

    let args = DaemonArgs::parse();
    let mut file = File::open(&args.config)
        .map_err(|e| format!("config file not found: {e:?}"))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| format!("unable to read config file: {e:?}"))?;
    let config: Config =
        json5::from_str(&contents).map_err(|e| format!("unable to parse config file: {e:?}"))?;

    let providers = ProviderSet {
        gps: SimulatedProvider::new("gps", config.providers.gps.clone()),
        network: SimulatedProvider::new("network", config.providers.network.clone()),
        geocode: SimulatedProvider::new("geocode", config.providers.geocode.clone()),
    };
    let fix_store = Arc::new(JsonFixStore::open(&config.daemon.fix_store_path));
    let sink = BusReplySink::new();

    let (engine, engine_handle) = FusionEngine::new(
        providers,
        fix_store,
        sink.clone(),
        config.engine.to_engine_config(),
    );
    let fix_cache = engine.fix_cache();
    tokio::spawn(engine.run());

    let server = BusServer::new(
        engine_handle,
        sink,
        fix_cache,
        &config.connectivity,
    );

    let socket_path = config.daemon.socket_path.clone();
    tokio::select! {
        served = server.serve(&socket_path) => {
            served.map_err(|e| format!("bus serve failed: {e:?}"))?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    Ok(())
}
