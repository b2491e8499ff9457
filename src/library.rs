use crate::failure::{Failure, Outcome};
use crate::state::RecordingDetails;
use std::path::Path;
use std::time::Duration;

/// List the saved recordings in `dir`, sorted by name.
///
/// Only `.wav` files directly inside `dir` count, so unsaved takes in the
/// `.pending` subdirectory are never listed. A missing directory is an empty
/// library.
pub fn list_recordings(dir: &Path) -> Outcome<Vec<RecordingDetails>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| {
        Failure::new(format!("Failed to read recordings directory {}: {}", dir.display(), e))
    })?;

    let mut recordings = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_wav = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        if !is_wav || !path.is_file() {
            continue;
        }

        recordings.push(RecordingDetails::new(&path, wav_duration(&path)));
    }

    recordings.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(recordings)
}

/// Duration from the WAV header, zero if the file cannot be read
fn wav_duration(path: &Path) -> Duration {
    match hound::WavReader::open(path) {
        Ok(reader) => {
            let rate = reader.spec().sample_rate.max(1);
            Duration::from_secs_f64(f64::from(reader.duration()) / f64::from(rate))
        }
        Err(e) => {
            tracing::warn!("Failed to read WAV header of {}: {}", path.display(), e);
            Duration::ZERO
        }
    }
}

/// Resolve a `play` argument: an existing path, or the name of a saved recording
pub fn resolve(dir: &Path, name_or_path: &str) -> Outcome<RecordingDetails> {
    let direct = Path::new(name_or_path);
    if direct.is_file() {
        return Ok(RecordingDetails::new(direct, wav_duration(direct)));
    }

    let saved = dir.join(format!("{}.wav", name_or_path));
    if saved.is_file() {
        return Ok(RecordingDetails::new(&saved, wav_duration(&saved)));
    }

    Err(Failure::new(format!("No recording named {:?}", name_or_path)))
}
