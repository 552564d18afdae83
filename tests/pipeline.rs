//! Pipeline Integration Tests
//!
//! End-to-end runs of the orchestrator against fake capabilities.

mod common;

use std::time::Duration;

use filetime::FileTime;
use tempfile::TempDir;

use common::{items, settings, CapturingEncoder, Fakes, RecordingFetcher, ScriptedProbe, StaticSource};
use reelmaker::adapters::EncodeInput;
use reelmaker::core::{CacheManager, Orchestrator, PipelineError, PROVENANCE_METADATA_KEY};
use reelmaker::domain::{
    ContentItem, RunState, SelectionCriteria, SortMode, TimeWindow, CANDIDATE_PAGE_SIZE,
};

fn criteria(limit: usize) -> SelectionCriteria {
    SelectionCriteria::new("aww+gifs", SortMode::Top, TimeWindow::Week, limit, false).unwrap()
}

fn candidates() -> Vec<ContentItem> {
    let mut candidates = items(&["a", "b", "c", "d", "e"]);
    candidates[1].nsfw = true;
    candidates[3].url = "https://i.redd.it/d.jpg".to_string();
    candidates
}

#[tokio::test]
async fn test_full_run() {
    let temp = TempDir::new().unwrap();
    let cache_dir = temp.path().join("cache");
    let output = temp.path().join("reel.mp4");

    let fakes = Fakes::new(
        StaticSource::new(candidates()),
        RecordingFetcher::new(),
        ScriptedProbe::new().silent("c"),
        CapturingEncoder::new(),
    );
    let orchestrator = Orchestrator::new(fakes.capabilities(), settings(&cache_dir));

    let run = orchestrator.run(&criteria(3), &output).await.unwrap();

    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.output.as_deref(), Some(output.as_path()));
    assert!(run.completed_at.is_some());
    assert_eq!(run.stats.candidates, 5);
    assert_eq!(run.stats.eligible, 3);
    assert_eq!(run.stats.fetched, 3);
    assert_eq!(run.stats.shortfall, 0);
    assert_eq!(std::fs::read(&output).unwrap(), b"encoded");

    // Source is always asked for a full page
    let requests = fakes.source.requests.lock().unwrap().clone();
    assert_eq!(
        requests,
        [("aww+gifs".to_string(), SortMode::Top, TimeWindow::Week, CANDIDATE_PAGE_SIZE)]
    );

    let jobs = fakes.encoder.jobs();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(
        job.inputs[..3],
        [
            EncodeInput::File(cache_dir.join("a.mp4")),
            EncodeInput::File(cache_dir.join("c.mp4")),
            EncodeInput::File(cache_dir.join("e.mp4")),
        ]
    );
    assert!(matches!(job.inputs[3], EncodeInput::Synthetic { .. }));
    assert!(job.filter_graph.ends_with("[v0][0:a][v1][3:a][v2][2:a]concat=n=3:v=1:a=1[v][a]"));
    assert_eq!(job.mappings, ["v", "a"]);
    assert_ne!(job.destination, output);

    let (key, provenance) = &job.metadata[0];
    assert_eq!(key, PROVENANCE_METADATA_KEY);
    assert!(provenance.contains("r/aww+gifs (sort: top, time: week)"));
    assert!(provenance.contains("1. Post a"));
    assert!(provenance.contains("2. Post c"));
    assert!(provenance.contains("3. Post e"));
    assert!(!provenance.contains("Post b"));

    // Output gets the same mode as any freshly written file
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let plain = temp.path().join("plain.txt");
        std::fs::write(&plain, b"").unwrap();
        let mode = |p: &std::path::Path| {
            std::fs::metadata(p).unwrap().permissions().mode() & 0o777
        };
        assert_eq!(mode(&output), mode(&plain));
    }
}

#[tokio::test]
async fn test_rerun_uses_cache() {
    let temp = TempDir::new().unwrap();
    let cache_dir = temp.path().join("cache");
    let fakes = Fakes::new(
        StaticSource::new(items(&["a", "b"])),
        RecordingFetcher::new(),
        ScriptedProbe::new(),
        CapturingEncoder::new(),
    );
    let orchestrator = Orchestrator::new(fakes.capabilities(), settings(&cache_dir));

    orchestrator.run(&criteria(2), &temp.path().join("one.mp4")).await.unwrap();
    let second = orchestrator.run(&criteria(2), &temp.path().join("two.mp4")).await.unwrap();

    assert_eq!(second.stats.cached, 2);
    assert_eq!(second.stats.fetched, 0);
    assert_eq!(fakes.fetcher.calls().len(), 2);
}

#[tokio::test]
async fn test_shortfall_is_not_fatal() {
    let temp = TempDir::new().unwrap();
    let fakes = Fakes::new(
        StaticSource::new(items(&["a", "b", "c"])),
        RecordingFetcher::new().failing_on("https://v.redd.it/b"),
        ScriptedProbe::new(),
        CapturingEncoder::new(),
    );
    let orchestrator = Orchestrator::new(fakes.capabilities(), settings(&temp.path().join("c")));

    let run = orchestrator.run(&criteria(10), &temp.path().join("out.mp4")).await.unwrap();

    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.stats.assets(), 2);
    assert_eq!(run.stats.fetch_failures, 1);
    assert_eq!(run.stats.shortfall, 8);
}

#[tokio::test]
async fn test_encode_failure_leaves_no_output() {
    let temp = TempDir::new().unwrap();
    let output = temp.path().join("reel.mp4");
    let diagnostics = "[concat @ 0x55] Input link in1:v0 parameters do not match";
    let fakes = Fakes::new(
        StaticSource::new(items(&["a", "b"])),
        RecordingFetcher::new(),
        ScriptedProbe::new(),
        CapturingEncoder::failing_with(diagnostics),
    );
    let orchestrator = Orchestrator::new(fakes.capabilities(), settings(&temp.path().join("c")));

    let err = orchestrator.run(&criteria(2), &output).await.unwrap_err();

    match err {
        PipelineError::Encode { diagnostics: got } => assert_eq!(got, diagnostics),
        other => panic!("expected encode error, got {:?}", other),
    }
    assert!(!output.exists());
    // Staging file is gone too
    let leftovers: Vec<_> = std::fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .filter(|name| name.to_string_lossy().starts_with(".reelmaker-"))
        .collect();
    assert!(leftovers.is_empty(), "leftover staging files: {:?}", leftovers);
}

#[tokio::test]
async fn test_missing_dependency_aborts_before_any_activity() {
    let temp = TempDir::new().unwrap();
    let cache_dir = temp.path().join("cache");
    let fakes = Fakes::new(
        StaticSource::new(items(&["a"])),
        RecordingFetcher::new().unhealthy(),
        ScriptedProbe::new(),
        CapturingEncoder::new(),
    );
    let orchestrator = Orchestrator::new(fakes.capabilities(), settings(&cache_dir));

    let err = orchestrator.run(&criteria(1), &temp.path().join("out.mp4")).await.unwrap_err();

    match err {
        PipelineError::DependencyMissing { tool, reason } => {
            assert_eq!(tool, "recording-fetcher");
            assert!(reason.contains("not found"));
        }
        other => panic!("expected missing dependency, got {:?}", other),
    }
    assert!(!cache_dir.exists());
    assert_eq!(fakes.source.request_count(), 0);
}

#[tokio::test]
async fn test_no_usable_assets() {
    let temp = TempDir::new().unwrap();
    let fakes = Fakes::new(
        StaticSource::new(items(&["a", "b"])),
        RecordingFetcher::new()
            .failing_on("https://v.redd.it/a")
            .failing_on("https://v.redd.it/b"),
        ScriptedProbe::new(),
        CapturingEncoder::new(),
    );
    let orchestrator = Orchestrator::new(fakes.capabilities(), settings(&temp.path().join("c")));

    let err = orchestrator.run(&criteria(2), &temp.path().join("out.mp4")).await.unwrap_err();

    assert!(matches!(err, PipelineError::NoUsableAssets { considered: 2 }));
    assert!(fakes.encoder.jobs().is_empty());
}

#[tokio::test]
async fn test_source_failure() {
    let temp = TempDir::new().unwrap();
    let fakes = Fakes::new(
        StaticSource::failing(),
        RecordingFetcher::new(),
        ScriptedProbe::new(),
        CapturingEncoder::new(),
    );
    let orchestrator = Orchestrator::new(fakes.capabilities(), settings(&temp.path().join("c")));

    let err = orchestrator.run(&criteria(2), &temp.path().join("out.mp4")).await.unwrap_err();
    assert!(matches!(err, PipelineError::Source(ref msg) if msg.contains("listing unavailable")));
}

#[tokio::test]
async fn test_probe_failure_is_fatal() {
    let temp = TempDir::new().unwrap();
    let output = temp.path().join("out.mp4");
    let fakes = Fakes::new(
        StaticSource::new(items(&["a", "b"])),
        RecordingFetcher::new(),
        ScriptedProbe::new().failing("b"),
        CapturingEncoder::new(),
    );
    let orchestrator = Orchestrator::new(fakes.capabilities(), settings(&temp.path().join("c")));

    let err = orchestrator.run(&criteria(2), &output).await.unwrap_err();

    assert!(matches!(err, PipelineError::Probe { .. }));
    assert!(fakes.encoder.jobs().is_empty());
    assert!(!output.exists());
}

#[tokio::test]
async fn test_concurrent_run_is_refused() {
    let temp = TempDir::new().unwrap();
    let cache_dir = temp.path().join("cache");
    std::fs::create_dir_all(&cache_dir).unwrap();
    let _held = CacheManager::new(&cache_dir, "mp4").lock().unwrap();

    let fakes = Fakes::new(
        StaticSource::new(items(&["a"])),
        RecordingFetcher::new(),
        ScriptedProbe::new(),
        CapturingEncoder::new(),
    );
    let orchestrator = Orchestrator::new(fakes.capabilities(), settings(&cache_dir));

    let err = orchestrator.run(&criteria(1), &temp.path().join("out.mp4")).await.unwrap_err();

    assert!(matches!(err, PipelineError::CacheLocked(_)));
    assert_eq!(fakes.source.request_count(), 0);
}

#[tokio::test]
async fn test_expired_entries_swept_before_run() {
    let temp = TempDir::new().unwrap();
    let cache_dir = temp.path().join("cache");
    std::fs::create_dir_all(&cache_dir).unwrap();

    // A stale cached copy of "a" must be refetched, not trusted
    let stale = cache_dir.join("a.mp4");
    std::fs::write(&stale, b"stale").unwrap();
    let old = FileTime::from_unix_time(1_000_000, 0);
    filetime::set_file_mtime(&stale, old).unwrap();

    let fakes = Fakes::new(
        StaticSource::new(items(&["a"])),
        RecordingFetcher::new(),
        ScriptedProbe::new(),
        CapturingEncoder::new(),
    );
    let mut settings = settings(&cache_dir);
    settings.cache_keep = Duration::from_secs(86_400);
    let orchestrator = Orchestrator::new(fakes.capabilities(), settings);

    let run = orchestrator.run(&criteria(1), &temp.path().join("out.mp4")).await.unwrap();

    assert_eq!(run.stats.fetched, 1);
    assert_eq!(run.stats.cached, 0);
    assert_eq!(std::fs::read(&stale).unwrap(), b"https://v.redd.it/a");
}
