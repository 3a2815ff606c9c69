// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Post-download tagging of materialized episodes.

mod episode;

use std::path::{Path, PathBuf};

pub use episode::{EpisodeMetadata, read_episode_metadata, write_episode_metadata};

use crate::episode::DownloadOutcome;
use crate::error::MetadataError;
use crate::feed::Episode;

/// Attaches descriptive metadata to an episode once it is stored.
///
/// Runs after the ledger commit; a failing tagger never undoes a download.
pub trait Tagger: Send + Sync {
    fn tag(&self, episode: &Episode, outcome: &DownloadOutcome) -> Result<(), MetadataError>;
}

/// Writes `<stem>.json` next to each stored audio file
#[derive(Debug, Clone)]
pub struct SidecarTagger {
    dir: PathBuf,
}

impl SidecarTagger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Location of the sidecar for an audio file stored as `location`
    pub fn sidecar_path(&self, location: &str) -> PathBuf {
        let stem = Path::new(location)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| location.to_string());
        self.dir.join(format!("{stem}.json"))
    }
}

impl Tagger for SidecarTagger {
    fn tag(&self, episode: &Episode, outcome: &DownloadOutcome) -> Result<(), MetadataError> {
        let metadata = EpisodeMetadata::new(episode, outcome);
        write_episode_metadata(&metadata, &self.sidecar_path(&outcome.reference.location))
    }
}
