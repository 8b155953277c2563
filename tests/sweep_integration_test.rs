//! Sweep orchestration tests with a scripted executor
//!
//! The executor answers each invocation from a closure, so every failure
//! path (timeouts, truncated telemetry, build failures) can be forced
//! without real kernels.

use kernel_sweep::config::{BuildOptions, SweepConfig, SweepKind, VariantSpec};
use kernel_sweep::report::{CellOutcome, SweepStatus};
use kernel_sweep::runner::{ExecutionOutcome, Executor, Invocation};
use kernel_sweep::space::RowKey;
use kernel_sweep::store::Cell;
use kernel_sweep::sweep::Sweep;
use kernel_sweep::{Error, FailureKind, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

type Script = dyn Fn(&Invocation) -> ExecutionOutcome + Send + Sync;

/// Executor that records invocations and answers from a script.
struct ScriptedExecutor {
    script: Box<Script>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedExecutor {
    fn new(script: impl Fn(&Invocation) -> ExecutionOutcome + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }
}

impl Executor for &ScriptedExecutor {
    async fn execute(&self, invocation: &Invocation) -> Result<ExecutionOutcome> {
        self.calls.lock().unwrap().push(invocation.clone());
        Ok((self.script)(invocation))
    }
}

fn success(stdout: &str) -> ExecutionOutcome {
    ExecutionOutcome::Success {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: 0,
    }
}

fn arg_value(invocation: &Invocation, flag: &str) -> Option<String> {
    let args = invocation.arg_list();
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn array_len(invocation: &Invocation) -> u64 {
    arg_value(invocation, "--array-len").unwrap().parse().unwrap()
}

/// Telemetry with `reps` rows, all timed at `seconds`.
fn telemetry(reps: u32, seconds: f64) -> String {
    let mut out = String::from("rep,timing,check_status\n");
    for rep in 0..reps {
        out.push_str(&format!("{rep},{seconds},0\n"));
    }
    out
}

fn variants_config(dir: &Path) -> SweepConfig {
    SweepConfig {
        name: "ab".to_string(),
        kind: SweepKind::Variants {
            variants: vec![VariantSpec::new("A", "./a"), VariantSpec::new("B", "./b")],
        },
        array_lens: vec![100, 1000],
        nb_bins: vec![1024],
        nb_repeat: 3,
        run_timeout_secs: 5,
        build_timeout_secs: 5,
        cooldown_ms: 0,
        output_csv: dir.join("results.csv"),
        summary_json: Some(dir.join("results.json")),
    }
}

fn key(array_len: u64) -> RowKey {
    RowKey {
        array_len,
        nb_bins: 1024,
    }
}

#[tokio::test]
async fn test_end_to_end_truncated_variant_is_sentinel() {
    let dir = tempfile::tempdir().unwrap();
    let config = variants_config(dir.path());

    let executor = ScriptedExecutor::new(|inv| {
        let is_a = inv.program() == Path::new("./a");
        match (is_a, array_len(inv)) {
            (true, 100) => success("rep,timing,check_status\n0,1.0,0\n1,0.9,0\n2,1.1,0"),
            // Truncated output: only two of three repetitions.
            (false, 100) => success("rep,timing,check_status\n0,1.0,0\n1,0.9,0\n"),
            (_, _) => success(&telemetry(3, 2.0)),
        }
    });

    let output = Sweep::new(&config, &executor).run().await.unwrap();
    let matrix = output.matrix();

    let a = matrix.get(key(100), "A").unwrap();
    let Cell::Measured(result) = a else {
        panic!("expected measurement, got {a:?}");
    };
    assert!((result.mean_seconds() - 1.0).abs() < 1e-12);
    assert_eq!(result.check_failures(), 0);
    assert_eq!(result.samples(), 2);
    assert_eq!(
        matrix.get(key(100), "B"),
        Some(&Cell::Missing(FailureKind::InsufficientSamples))
    );

    let csv = std::fs::read_to_string(&config.output_csv).unwrap();
    assert_eq!(csv, "array_len,A,B\n100,1.0,N/A\n1000,2.0,2.0\n");

    let report = output.report();
    assert_eq!(report.status(), SweepStatus::Completed);
    assert_eq!(report.failures().count(), 1);
    assert!(config.summary_json.as_ref().unwrap().exists());
}

#[tokio::test]
async fn test_invocations_follow_enumeration_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = variants_config(dir.path());
    let executor = ScriptedExecutor::new(|_| success(&telemetry(3, 1.0)));

    Sweep::new(&config, &executor).run().await.unwrap();

    let order: Vec<(PathBuf, u64)> = executor
        .calls()
        .iter()
        .map(|inv| (inv.program().to_path_buf(), array_len(inv)))
        .collect();
    assert_eq!(
        order,
        vec![
            (PathBuf::from("./a"), 100),
            (PathBuf::from("./b"), 100),
            (PathBuf::from("./a"), 1000),
            (PathBuf::from("./b"), 1000),
        ]
    );
    assert!(executor.calls().iter().all(|inv| arg_value(inv, "--nb-repeat").as_deref() == Some("3")));
}

#[tokio::test]
async fn test_forced_timeout_keeps_row_full_width() {
    let dir = tempfile::tempdir().unwrap();
    let config = variants_config(dir.path());
    let executor = ScriptedExecutor::new(|inv| {
        if inv.program() == Path::new("./b") && array_len(inv) == 1000 {
            ExecutionOutcome::Timeout
        } else {
            success(&telemetry(3, 0.5))
        }
    });

    let output = Sweep::new(&config, &executor).run().await.unwrap();

    let csv = std::fs::read_to_string(&config.output_csv).unwrap();
    assert_eq!(csv, "array_len,A,B\n100,0.5,0.5\n1000,0.5,N/A\n");
    assert_eq!(
        output.matrix().get(key(1000), "B"),
        Some(&Cell::Missing(FailureKind::ProcessTimeout))
    );
    assert!(output.matrix().rows().iter().all(|r| r.cells().len() == 2));
}

#[tokio::test]
async fn test_every_failure_kind_is_a_sentinel() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = variants_config(dir.path());
    config.array_lens = vec![1, 2, 3, 4, 5];
    config.kind = SweepKind::Variants {
        variants: vec![VariantSpec::new("A", "./a")],
    };

    let executor = ScriptedExecutor::new(|inv| match array_len(inv) {
        1 => ExecutionOutcome::NotFound,
        2 => ExecutionOutcome::NonZeroExit {
            exit_code: Some(1),
            stderr: "invalid NB_BINS argument".to_string(),
        },
        3 => success("rep,timing,check_status\n"),
        4 => success("rep,timing,check_status\n2,1.0,0\n1,1.0,0\n0,1.0,0\n"),
        _ => success(&telemetry(3, 1.0)),
    });

    let output = Sweep::new(&config, &executor).run().await.unwrap();
    let kinds: Vec<Option<FailureKind>> = output.report().cells().iter().map(|c| c.failure()).collect();
    assert_eq!(
        kinds,
        vec![
            Some(FailureKind::ExecutableNotFound),
            Some(FailureKind::NonZeroExit),
            Some(FailureKind::EmptyTelemetry),
            Some(FailureKind::InvalidTelemetry),
            None,
        ]
    );
    assert_eq!(output.matrix().rows().len(), 5);
}

#[tokio::test]
async fn test_cold_first_run_never_enters_the_mean() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = variants_config(dir.path());
    config.array_lens = vec![100];
    let executor = ScriptedExecutor::new(|inv| {
        if inv.program() == Path::new("./a") {
            success("rep,timing,check_status\n1,100.0,0\n2,1.0,0\n3,1.0,0\n")
        } else {
            success("rep,timing,check_status\n0,100.0,0\n1,1.0,0\n2,1.0,0\n")
        }
    });

    let output = Sweep::new(&config, &executor).run().await.unwrap();

    assert_eq!(
        output.matrix().get(key(100), "A"),
        Some(&Cell::Missing(FailureKind::InvalidTelemetry))
    );
    let Some(Cell::Measured(result)) = output.matrix().get(key(100), "B") else {
        panic!("expected measurement");
    };
    assert_eq!(result.samples(), 2);
    assert!((result.mean_seconds() - 1.0).abs() < 1e-12);
}

#[tokio::test]
async fn test_check_failures_surface_without_excluding_timings() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = variants_config(dir.path());
    config.array_lens = vec![100];
    let executor = ScriptedExecutor::new(|_| success("rep,timing,check_status\n0,9.0,0\n1,1.0,1\n2,3.0,0\n"));

    let output = Sweep::new(&config, &executor).run().await.unwrap();

    let Some(Cell::Measured(result)) = output.matrix().get(key(100), "A") else {
        panic!("expected measurement");
    };
    assert_eq!(result.check_failures(), 1);
    assert!((result.mean_seconds() - 2.0).abs() < 1e-12);
    assert_eq!(output.report().check_failures().count(), 2);
}

fn block_config(dir: &Path) -> SweepConfig {
    SweepConfig {
        name: "blocks".to_string(),
        kind: SweepKind::BlockSize {
            block_sizes: vec![64, 128, 256],
            build: BuildOptions::nvcc(dir.join("histogram_cuda.cu"), dir.join("histogram_cuda")),
        },
        array_lens: vec![100, 1000],
        nb_bins: vec![1024],
        nb_repeat: 2,
        run_timeout_secs: 5,
        build_timeout_secs: 5,
        cooldown_ms: 0,
        output_csv: dir.join("blocks.csv"),
        summary_json: None,
    }
}

/// Fake `nvcc`: writes the `-o` target unless asked for block size 128.
fn fake_nvcc(inv: &Invocation) -> ExecutionOutcome {
    if inv.arg_list().iter().any(|a| a == "-DBLOCK_SIZE=128") {
        return ExecutionOutcome::NonZeroExit {
            exit_code: Some(2),
            stderr: "ptxas error: too many resources requested".to_string(),
        };
    }
    let out = arg_value(inv, "-o").unwrap();
    std::fs::write(out, b"binary").unwrap();
    success("")
}

#[tokio::test]
async fn test_build_failure_only_blanks_its_column() {
    let dir = tempfile::tempdir().unwrap();
    let config = block_config(dir.path());
    let executor = ScriptedExecutor::new(|inv| {
        if inv.program() == Path::new("nvcc") {
            fake_nvcc(inv)
        } else {
            success(&telemetry(2, 0.25))
        }
    });

    let output = Sweep::new(&config, &executor).run().await.unwrap();

    let csv = std::fs::read_to_string(&config.output_csv).unwrap();
    assert_eq!(
        csv,
        "array_len,BS_64,BS_128,BS_256\n100,0.25,N/A,0.25\n1000,0.25,N/A,0.25\n"
    );

    // All builds precede all runs, and the failed size is never launched.
    let calls = executor.calls();
    let programs: Vec<String> = calls.iter().map(|c| c.program().display().to_string()).collect();
    assert!(programs[..3].iter().all(|p| p == "nvcc"));
    assert!(programs[3..].iter().all(|p| p != "nvcc"));
    assert!(!programs.iter().any(|p| p.ends_with("histogram_cuda_128")));
    assert_eq!(calls.len(), 3 + 4);

    let build_failures = output
        .report()
        .failures()
        .filter(|c| c.failure() == Some(FailureKind::BuildFailure))
        .count();
    assert_eq!(build_failures, 2);

    // Artifacts are gone once the sweep returns.
    for bs in [64, 128, 256] {
        assert!(!dir.path().join(format!("histogram_cuda_{bs}")).exists());
    }
}

#[tokio::test]
async fn test_no_artifact_built_still_writes_full_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let config = block_config(dir.path());
    let executor = ScriptedExecutor::new(|_| ExecutionOutcome::NotFound);

    let output = Sweep::new(&config, &executor).run().await.unwrap();

    assert_eq!(executor.calls().len(), 3);
    assert_eq!(output.matrix().sentinels().count(), 6);
    let csv = std::fs::read_to_string(&config.output_csv).unwrap();
    assert_eq!(csv.lines().count(), 3);
}

#[tokio::test]
async fn test_failed_build_keeps_file_it_did_not_create() {
    let dir = tempfile::tempdir().unwrap();
    let config = block_config(dir.path());
    let earlier = dir.path().join("histogram_cuda_64");
    std::fs::write(&earlier, b"earlier build").unwrap();

    let executor = ScriptedExecutor::new(|_| ExecutionOutcome::NonZeroExit {
        exit_code: Some(1),
        stderr: "nvcc fatal".to_string(),
    });

    let output = Sweep::new(&config, &executor).run().await.unwrap();

    assert_eq!(output.matrix().sentinels().count(), 6);
    assert_eq!(std::fs::read(&earlier).unwrap(), b"earlier build");
}

#[tokio::test]
async fn test_successful_rebuild_takes_over_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = block_config(dir.path());
    let earlier = dir.path().join("histogram_cuda_64");
    std::fs::write(&earlier, b"earlier build").unwrap();

    let executor = ScriptedExecutor::new(|inv| {
        if inv.program() == Path::new("nvcc") {
            fake_nvcc(inv)
        } else {
            success(&telemetry(2, 0.25))
        }
    });

    Sweep::new(&config, &executor).run().await.unwrap();
    assert!(!earlier.exists());
}

#[tokio::test]
async fn test_artifacts_removed_when_results_cannot_be_written() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = block_config(dir.path());
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();
    config.output_csv = blocker.join("blocks.csv");

    let executor = ScriptedExecutor::new(|inv| {
        if inv.program() == Path::new("nvcc") {
            fake_nvcc(inv)
        } else {
            success(&telemetry(2, 0.25))
        }
    });

    let err = Sweep::new(&config, &executor).run().await.unwrap_err();
    assert!(matches!(err, Error::ResultWrite { .. }));
    assert!(!dir.path().join("histogram_cuda_64").exists());
    assert!(!dir.path().join("histogram_cuda_256").exists());
}

#[tokio::test]
async fn test_thread_count_travels_in_env_overlay() {
    let dir = tempfile::tempdir().unwrap();
    let config = SweepConfig {
        name: "threads".to_string(),
        kind: SweepKind::ThreadScaling {
            executable: PathBuf::from("./histogram_omp"),
            thread_counts: vec![1, 4],
            thread_env: "OMP_NUM_THREADS".to_string(),
        },
        array_lens: vec![100],
        nb_bins: vec![5],
        nb_repeat: 2,
        run_timeout_secs: 5,
        build_timeout_secs: 5,
        cooldown_ms: 0,
        output_csv: dir.path().join("threads.csv"),
        summary_json: None,
    };
    let executor = ScriptedExecutor::new(|inv| {
        let threads: f64 = inv.env_overlay()["OMP_NUM_THREADS"].parse().unwrap();
        success(&telemetry(2, 1.0 / threads))
    });

    Sweep::new(&config, &executor).run().await.unwrap();

    let envs: Vec<String> = executor
        .calls()
        .iter()
        .map(|c| c.env_overlay()["OMP_NUM_THREADS"].clone())
        .collect();
    assert_eq!(envs, vec!["1", "4"]);
    let csv = std::fs::read_to_string(&config.output_csv).unwrap();
    assert_eq!(csv, "array_len,T_1,T_4\n100,1.0,0.25\n");
}

#[tokio::test]
async fn test_invalid_config_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = variants_config(dir.path());
    config.array_lens.clear();
    let executor = ScriptedExecutor::new(|_| success(""));

    let err = Sweep::new(&config, &executor).run().await.unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
    assert!(executor.calls().is_empty());
    assert!(!config.output_csv.exists());
}

#[tokio::test]
async fn test_summary_json_lists_failures() {
    let dir = tempfile::tempdir().unwrap();
    let config = variants_config(dir.path());
    let executor = ScriptedExecutor::new(|inv| {
        if inv.program() == Path::new("./a") {
            ExecutionOutcome::Timeout
        } else {
            success(&telemetry(3, 1.0))
        }
    });

    Sweep::new(&config, &executor).run().await.unwrap();

    let text = std::fs::read_to_string(config.summary_json.as_ref().unwrap()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["status"], "Completed");
    let cells = json["cells"].as_array().unwrap();
    assert_eq!(cells.len(), 4);
    assert_eq!(cells[0]["kind"], "process_timeout");
    assert_eq!(cells[1]["outcome"], "measured");
    assert!(matches!(
        serde_json::from_value::<CellOutcome>(cells[1].clone()),
        Ok(CellOutcome::Measured { .. })
    ));
}
