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

//! JSON-file last-known-fix store.

use async_trait::async_trait;
use loc_fusion::{FixStore, PositionSample, ProviderKind};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;
use tracing::warn;

const COMPONENT: &str = "fix_store";

fn kind_from_label(label: &str) -> Option<ProviderKind> {
    ProviderKind::ALL
        .into_iter()
        .find(|kind| kind.label() == label)
}

/// Persists one fix per provider as a small JSON map. The in-memory map is
/// authoritative between writes; a corrupt or missing file simply starts
/// the cache cold.
pub(crate) struct JsonFixStore {
    path: PathBuf,
    fixes: StdMutex<HashMap<String, PositionSample>>,
}

impl JsonFixStore {
    pub(crate) fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let fixes = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(
                        component = COMPONENT,
                        path = %path.display(),
                        err = %err,
                        "fix store unreadable; starting cold"
                    );
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            fixes: StdMutex::new(fixes),
        }
    }

    fn write_through(&self, serialized: String) {
        if let Err(err) = std::fs::write(&self.path, serialized) {
            warn!(
                component = COMPONENT,
                path = %self.path.display(),
                err = %err,
                "fix store write failed"
            );
        }
    }
}

#[async_trait]
impl FixStore for JsonFixStore {
    async fn load(&self) -> HashMap<ProviderKind, PositionSample> {
        self.fixes
            .lock()
            .expect("lock fix map")
            .iter()
            .filter_map(|(label, sample)| kind_from_label(label).map(|kind| (kind, *sample)))
            .collect()
    }

    async fn persist(&self, kind: ProviderKind, sample: PositionSample) {
        let serialized = {
            let mut fixes = self.fixes.lock().expect("lock fix map");
            fixes.insert(kind.label().to_string(), sample);
            serde_json::to_string_pretty(&*fixes).expect("fix map serializes")
        };
        self.write_through(serialized);
    }
}
