/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Cluster-wide GRES policy flags.
//!
//! The expected YAML structure is:
//! ```yaml
//! ll_shared_gres: true
//! multiple_sharing_gres_pj: false
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Raw YAML layout. Kept private — callers use [`GresPolicy`].
#[derive(Debug, Deserialize)]
struct GresPolicyFile {
    #[serde(default)]
    ll_shared_gres: bool,
    #[serde(default)]
    multiple_sharing_gres_pj: bool,
}

/// Cluster-wide flags that steer the shared-GRES pickers.
///
/// * `ll_shared_gres` — order shared-GRES topology slots least-loaded first
///   (see [`crate::gres::shared_select::least_loaded_topo_index`]).
/// * `multiple_sharing_gres_pj` — allow a per-node or per-task shared
///   request to draw from more than one sharing device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GresPolicy {
    pub ll_shared_gres: bool,
    pub multiple_sharing_gres_pj: bool,
}

impl GresPolicy {
    /// Conservative defaults used when no policy file is supplied: natural
    /// topology-slot order, one sharing device per request.
    pub fn defaults() -> Self {
        GresPolicy {
            ll_shared_gres: false,
            multiple_sharing_gres_pj: false,
        }
    }

    /// Parses `path` as a policy-flags YAML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or the YAML is
    /// structurally invalid. There is no "fall back to defaults on missing
    /// fields" behavior for the file itself — a present-but-empty file is
    /// valid and yields [`GresPolicy::defaults`].
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("loading gres policy configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot open gres policy file: {}", path.display()))?;

        let file: GresPolicyFile = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse gres policy yaml: {}", path.display()))?;

        let policy = GresPolicy {
            ll_shared_gres: file.ll_shared_gres,
            multiple_sharing_gres_pj: file.multiple_sharing_gres_pj,
        };

        if !policy.ll_shared_gres && !policy.multiple_sharing_gres_pj {
            warn!("gres policy file sets no flags — shared-gres selection uses conservative defaults");
        }
        debug!(?policy, "loaded gres policy");

        Ok(policy)
    }
}
