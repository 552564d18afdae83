//! Filter graph synthesis.
//!
//! Every asset is normalized into the same output box and then
//! concatenated. The graph is modeled as typed nodes and labeled edges
//! and only turned into ffmpeg's `-filter_complex` syntax at the
//! boundary, e.g. for two assets where only the first has audio:
//!
//! ```text
//! [0:v]scale=1280:720:force_original_aspect_ratio=decrease,pad=1280:720:(ow-iw)/2:(oh-ih)/2,setsar=1[v0];
//! [1:v]scale=1280:720:force_original_aspect_ratio=decrease,pad=1280:720:(ow-iw)/2:(oh-ih)/2,setsar=1[v1];
//! [v0][0:a][v1][2:a]concat=n=2:v=1:a=1[v][a]
//! ```
//!
//! Input `2` is the single silent audio source appended after the
//! assets. It is declared once and referenced by every asset that has no
//! audio of its own.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::error::PipelineError;
use crate::adapters::{EncodeInput, MediaProbe};
use crate::domain::{DownloadedItem, MediaAsset, OutputSize};

/// lavfi source generating silence
pub const SILENT_SOURCE: &str = "anullsrc";

/// Length of the silent source; concat stretches it to each segment
pub const SILENT_DURATION_SECS: f64 = 0.1;

/// Label of the concatenated video stream
pub const VIDEO_OUT: &str = "v";

/// Label of the concatenated audio stream
pub const AUDIO_OUT: &str = "a";

/// Stream type selector on an encoder input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

/// An edge endpoint: either a stream of an input or a named label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pad {
    Input { index: usize, kind: StreamKind },
    Label(String),
}

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pad::Input { index, kind } => {
                let kind = match kind {
                    StreamKind::Video => 'v',
                    StreamKind::Audio => 'a',
                };
                write!(f, "[{}:{}]", index, kind)
            }
            Pad::Label(label) => write!(f, "[{}]", label),
        }
    }
}

/// One step of a normalization chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFilter {
    /// Scale down (or up) to fit inside the box, keeping aspect ratio
    ScaleToFit { width: u32, height: u32 },

    /// Letterbox to exactly the box, content centered
    PadCentered { width: u32, height: u32 },

    /// Force square pixels so concat sees identical sample aspect ratios
    SquarePixels,
}

impl fmt::Display for VideoFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoFilter::ScaleToFit { width, height } => write!(
                f,
                "scale={}:{}:force_original_aspect_ratio=decrease",
                width, height
            ),
            VideoFilter::PadCentered { width, height } => {
                write!(f, "pad={}:{}:(ow-iw)/2:(oh-ih)/2", width, height)
            }
            VideoFilter::SquarePixels => f.write_str("setsar=1"),
        }
    }
}

/// Per-asset normalization: `[i:v] -> filters -> [v{i}]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeChain {
    pub input: Pad,
    pub filters: Vec<VideoFilter>,
    pub output: String,
}

impl NormalizeChain {
    fn for_input(index: usize, size: OutputSize) -> Self {
        Self {
            input: Pad::Input {
                index,
                kind: StreamKind::Video,
            },
            filters: vec![
                VideoFilter::ScaleToFit {
                    width: size.width,
                    height: size.height,
                },
                VideoFilter::PadCentered {
                    width: size.width,
                    height: size.height,
                },
                VideoFilter::SquarePixels,
            ],
            output: format!("v{}", index),
        }
    }

    /// Target box of the chain's pad step
    pub fn target(&self) -> Option<OutputSize> {
        self.filters.iter().find_map(|f| match f {
            VideoFilter::PadCentered { width, height } => Some(OutputSize::new(*width, *height)),
            _ => None,
        })
    }
}

impl fmt::Display for NormalizeChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.input)?;
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", filter)?;
        }
        write!(f, "[{}]", self.output)
    }
}

/// The shared silent audio input
#[derive(Debug, Clone, PartialEq)]
pub struct SilentSource {
    /// Encoder input index (always after the assets)
    pub input_index: usize,
    pub source: String,
    pub duration_secs: f64,
}

impl SilentSource {
    pub fn pad(&self) -> Pad {
        Pad::Input {
            index: self.input_index,
            kind: StreamKind::Audio,
        }
    }
}

/// Where a segment's audio comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSource {
    /// The asset's own first audio stream
    Own,
    /// The shared silent source
    Silent,
}

/// One (video, audio) pair fed into concat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatSegment {
    pub video: Pad,
    pub audio: Pad,
    pub audio_source: AudioSource,
}

/// The concat node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatNode {
    pub segments: Vec<ConcatSegment>,
    pub video_out: String,
    pub audio_out: String,
}

impl fmt::Display for ConcatNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "{}{}", segment.video, segment.audio)?;
        }
        write!(
            f,
            "concat=n={}:v=1:a=1[{}][{}]",
            self.segments.len(),
            self.video_out,
            self.audio_out
        )
    }
}

/// Normalization + concatenation graph for one run
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    pub chains: Vec<NormalizeChain>,
    pub silence: SilentSource,
    pub concat: ConcatNode,
}

impl FilterGraph {
    /// Build the graph for assets in selection order.
    ///
    /// Returns `None` for an empty asset list; concat needs at least one
    /// segment.
    pub fn build(assets: &[MediaAsset], size: OutputSize) -> Option<Self> {
        let has_audio: Vec<bool> = assets.iter().map(|a| a.has_audio).collect();
        Self::from_audio_layout(&has_audio, size)
    }

    /// Build the graph from per-asset audio presence alone
    pub fn from_audio_layout(has_audio: &[bool], size: OutputSize) -> Option<Self> {
        if has_audio.is_empty() {
            return None;
        }

        let silence = SilentSource {
            input_index: has_audio.len(),
            source: SILENT_SOURCE.to_string(),
            duration_secs: SILENT_DURATION_SECS,
        };

        let chains: Vec<NormalizeChain> = (0..has_audio.len())
            .map(|i| NormalizeChain::for_input(i, size))
            .collect();

        let segments = chains
            .iter()
            .zip(has_audio)
            .enumerate()
            .map(|(i, (chain, &own_audio))| {
                let (audio, audio_source) = if own_audio {
                    (
                        Pad::Input {
                            index: i,
                            kind: StreamKind::Audio,
                        },
                        AudioSource::Own,
                    )
                } else {
                    (silence.pad(), AudioSource::Silent)
                };
                ConcatSegment {
                    video: Pad::Label(chain.output.clone()),
                    audio,
                    audio_source,
                }
            })
            .collect();

        Some(Self {
            chains,
            silence,
            concat: ConcatNode {
                segments,
                video_out: VIDEO_OUT.to_string(),
                audio_out: AUDIO_OUT.to_string(),
            },
        })
    }

    /// Number of segments referencing the shared silent source
    pub fn silent_references(&self) -> usize {
        self.concat
            .segments
            .iter()
            .filter(|s| s.audio_source == AudioSource::Silent)
            .count()
    }

    /// Output labels to map, video first
    pub fn output_labels(&self) -> Vec<String> {
        vec![self.concat.video_out.clone(), self.concat.audio_out.clone()]
    }

    /// Encoder inputs: the asset files in order, then the silent source
    pub fn encode_inputs(&self, assets: &[MediaAsset]) -> Vec<EncodeInput> {
        assets
            .iter()
            .map(|a| EncodeInput::File(a.path.clone()))
            .chain(std::iter::once(EncodeInput::Synthetic {
                source: self.silence.source.clone(),
                duration_secs: self.silence.duration_secs,
            }))
            .collect()
    }
}

impl fmt::Display for FilterGraph {
    /// ffmpeg `-filter_complex` syntax
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for chain in &self.chains {
            write!(f, "{};", chain)?;
        }
        write!(f, "{}", self.concat)
    }
}

/// Probes downloaded media and synthesizes the filter graph
pub struct FilterGraphBuilder {
    probe: Arc<dyn MediaProbe>,
    size: OutputSize,
    probe_timeout: Duration,
}

impl FilterGraphBuilder {
    pub fn new(probe: Arc<dyn MediaProbe>, size: OutputSize, probe_timeout: Duration) -> Self {
        Self {
            probe,
            size,
            probe_timeout,
        }
    }

    /// Probe every item for audio presence.
    ///
    /// Any probe failure aborts: normalization needs complete audio
    /// knowledge up front.
    pub async fn probe_all(
        &self,
        items: Vec<DownloadedItem>,
    ) -> Result<Vec<MediaAsset>, PipelineError> {
        let mut assets = Vec::with_capacity(items.len());

        for item in items {
            let info = self
                .probe
                .probe(&item.path, self.probe_timeout)
                .await
                .map_err(|e| PipelineError::Probe {
                    path: item.path.clone(),
                    reason: e.to_string(),
                })?;

            debug!(
                id = %item.item.id,
                has_audio = info.has_audio,
                duration = ?info.duration,
                "Probed asset"
            );
            assets.push(MediaAsset::new(item, info.has_audio, info.duration));
        }

        Ok(assets)
    }

    /// Build the graph for probed assets
    pub fn build(&self, assets: &[MediaAsset]) -> Result<FilterGraph, PipelineError> {
        let graph = FilterGraph::build(assets, self.size)
            .ok_or(PipelineError::NoUsableAssets { considered: 0 })?;

        info!(
            segments = graph.concat.segments.len(),
            silent = graph.silent_references(),
            size = %self.size,
            "Built filter graph"
        );
        Ok(graph)
    }
}
