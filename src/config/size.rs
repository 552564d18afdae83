//! Output size presets and literal dimensions.

use crate::core::error::PipelineError;
use crate::domain::OutputSize;

/// Named presets, lowercase
const PRESETS: &[(&str, OutputSize)] = &[
    ("360p", OutputSize::new(640, 360)),
    ("480p", OutputSize::new(854, 480)),
    ("720p", OutputSize::new(1280, 720)),
    ("1080p", OutputSize::new(1920, 1080)),
    ("1440p", OutputSize::new(2560, 1440)),
    ("2160p", OutputSize::new(3840, 2160)),
    ("4k", OutputSize::new(3840, 2160)),
];

/// Parse a preset name (`720p`, `4k`) or literal `WxH` / `W:H`.
///
/// Both dimensions must be positive and even, which 4:2:0 encoders
/// require.
pub fn parse_output_size(input: &str) -> Result<OutputSize, PipelineError> {
    let normalized = input.trim().to_ascii_lowercase();

    if let Some((_, size)) = PRESETS.iter().find(|(name, _)| *name == normalized) {
        return Ok(*size);
    }

    let invalid = |reason: &str| {
        PipelineError::Configuration(format!("invalid output size '{}': {}", input, reason))
    };

    let (width, height) = normalized
        .split_once(|c| c == 'x' || c == ':')
        .ok_or_else(|| invalid("expected a preset (360p..2160p, 4k) or WxH"))?;

    let width: u32 = width.trim().parse().map_err(|_| invalid("bad width"))?;
    let height: u32 = height.trim().parse().map_err(|_| invalid("bad height"))?;

    if width == 0 || height == 0 {
        return Err(invalid("dimensions must be positive"));
    }
    if width % 2 != 0 || height % 2 != 0 {
        return Err(invalid("dimensions must be even"));
    }

    Ok(OutputSize::new(width, height))
}
