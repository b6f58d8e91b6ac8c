use sentiflow::engine::{Cli, RunHooks, build_opts, ensure_clean_run, normalize, run_posts, tag};
use sentiflow::pipeline::{CancelToken, Feed, IterFeed, LineFeed, TryIterFeed, generate};
use sentiflow::utils::{apply_env_to_opts, apply_file_to_opts, parse_sentiflow_toml};
use sentiflow::{ErrorPolicy, FeedOutcome, Opts, Post, Tagged, Termination, run};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

fn post(id: u64, text: &str) -> Post {
    Post {
        id,
        text: text.to_string(),
    }
}

fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |k| map.get(k).cloned()
}

fn no_env(_: &str) -> Option<String> {
    None
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sentiflow-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

// --- normalize ---

#[test]
fn test_normalize_collapses_whitespace() {
    let out = normalize(post(1, "  hello \t  big\n world  ")).unwrap();
    assert_eq!(out.text, "hello big world");
    assert_eq!(out.id, 1);
}

#[test]
fn test_normalize_rejects_blank_post() {
    let err = normalize(post(7, " \t ")).unwrap_err();
    assert!(err.to_string().contains("post #7 is empty"));
}

#[test]
fn test_normalize_rejects_long_post() {
    let err = normalize(post(3, &"x".repeat(281))).unwrap_err();
    assert!(err.to_string().contains("281 chars"));
    assert!(normalize(post(4, &"é".repeat(280))).is_ok());
}

// --- tag ---

#[test]
fn test_tag_extracts_hashtags_and_mentions() {
    let tagged = tag(post(2, "Loving #Rust and #rust! thanks @Ferris, see #async_io")).unwrap();
    assert_eq!(tagged.hashtags, vec!["rust", "async_io"]);
    assert_eq!(tagged.mentions, vec!["ferris"]);
}

#[test]
fn test_tag_ignores_bare_sigils_and_inner_marks() {
    let tagged = tag(post(5, "a # b @ mail@example.com c#d")).unwrap();
    assert!(tagged.hashtags.is_empty());
    assert!(tagged.mentions.is_empty());
}

#[test]
fn test_tagged_display() {
    let tagged = tag(post(9, "hi @bob #news")).unwrap();
    assert_eq!(tagged.to_string(), "#9\thi @bob #news\t[#news @bob]");
    let plain = tag(post(10, "no tags")).unwrap();
    assert_eq!(plain.to_string(), "#10\tno tags");
}

// --- LineFeed ---

fn collect_posts(feed: LineFeed) -> Vec<Post> {
    let ctx = CancelToken::new();
    let (rx, handle) = generate(&ctx, feed, None).unwrap();
    let posts = rx.iter().collect();
    assert_eq!(handle.join().unwrap().outcome, FeedOutcome::Exhausted);
    posts
}

#[test]
fn test_line_feed_skips_blank_lines_and_numbers_by_line() {
    let feed = LineFeed::from_reader(Cursor::new("first\n\n   \nsecond\r\n"));
    let posts = collect_posts(feed);
    assert_eq!(posts, vec![post(1, "first"), post(4, "second")]);
}

#[test]
fn test_line_feed_track_filter_case_insensitive() {
    let feed = LineFeed::from_reader(Cursor::new("Rust is fun\ngo is fine\nI like RUST\n"))
        .track(&["rust", "  "]);
    let posts = collect_posts(feed);
    let ids: Vec<u64> = posts.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1, 3]);
}

#[test]
fn test_line_feed_missing_file_fails_on_connect() {
    let ctx = CancelToken::new();
    let feed = LineFeed::open("/definitely/not/here.txt");
    let err = generate(&ctx, feed, None).err().unwrap();
    let msg = format!("{:#}", err);
    assert!(msg.contains("connect feed"));
    assert!(msg.contains("/definitely/not/here.txt"));
}

#[test]
fn test_line_feed_cannot_connect_twice() {
    let mut feed = LineFeed::from_reader(Cursor::new("x\n"));
    feed.connect().unwrap();
    assert!(feed.connect().is_err());
}

#[test]
fn test_line_feed_keeps_posts_after_invalid_utf8() {
    let input = b"first post\nbad \xff\xfe line\nthird post\nfourth post\n".to_vec();
    let posts = collect_posts(LineFeed::from_reader(Cursor::new(input)));
    let ids: Vec<u64> = posts.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert!(posts[1].text.starts_with("bad "));
    assert!(posts[1].text.contains('\u{FFFD}'));
    assert_eq!(posts[3].text, "fourth post");
}

#[test]
fn test_run_posts_invalid_utf8_line_still_completes() {
    let ctx = CancelToken::new();
    let input = b"first post\nbad \xff\xfe line\nthird post\nfourth post\n".to_vec();
    let report = run_posts(
        &ctx,
        LineFeed::from_reader(Cursor::new(input)),
        &Opts::default(),
        RunHooks::default(),
    )
    .unwrap();
    assert_eq!(report.summary.count, 4);
    assert_eq!(report.summary.reason, Termination::Completed);
    assert!(ensure_clean_run(&report).is_ok());
}

// --- config file ---

#[test]
fn test_parse_toml_applies_present_fields_only() {
    let file = parse_sentiflow_toml(
        r#"
[settings]
limit = 3
track = ["rust", "go"]
error_policy = "continue"
capacity = 8
"#,
    )
    .unwrap();
    let mut opts = Opts::default();
    let default_branches = opts.branches;
    apply_file_to_opts(&file, &mut opts);

    assert_eq!(opts.limit, 3);
    assert_eq!(opts.track, vec!["rust", "go"]);
    assert_eq!(opts.error_policy, ErrorPolicy::Continue);
    assert_eq!(opts.channel_capacity, Some(8));
    assert_eq!(opts.branches, default_branches);
}

#[test]
fn test_parse_toml_rejects_unknown_setting() {
    assert!(parse_sentiflow_toml("[settings]\nworkers = 4\n").is_err());
}

#[test]
fn test_parse_toml_empty_is_default() {
    let file = parse_sentiflow_toml("").unwrap();
    let mut opts = Opts::default();
    apply_file_to_opts(&file, &mut opts);
    assert_eq!(opts.progress_every, Opts::default().progress_every);
}

// --- environment ---

#[test]
fn test_env_overrides_numbers() {
    let mut opts = Opts::default();
    let lookup = lookup_from(&[
        ("SENTIFLOW_LIMIT", "5"),
        ("SENTIFLOW_BRANCHES", " 3 "),
        ("SENTIFLOW_CAPACITY", "0"),
        ("SENTIFLOW_PROGRESS_EVERY", ""),
    ]);
    apply_env_to_opts(lookup, &mut opts).unwrap();
    assert_eq!(opts.limit, 5);
    assert_eq!(opts.branches, 3);
    assert_eq!(opts.channel_capacity, Some(0));
    assert_eq!(opts.progress_every, Opts::default().progress_every);
}

#[test]
fn test_env_invalid_value_names_variable() {
    let mut opts = Opts::default();
    let err = apply_env_to_opts(lookup_from(&[("SENTIFLOW_LIMIT", "many")]), &mut opts)
        .unwrap_err();
    assert!(format!("{:#}", err).contains("SENTIFLOW_LIMIT"));
}

// --- layering ---

#[test]
fn test_build_opts_cli_beats_env_beats_file() {
    let dir = scratch_dir("layering");
    std::fs::write(
        dir.join(".sentiflow.toml"),
        "[settings]\nlimit = 2\nbranches = 4\nprogress_every = 7\n",
    )
    .unwrap();
    let cli = Cli {
        limit: Some(9),
        ..Default::default()
    };
    let lookup = lookup_from(&[("SENTIFLOW_LIMIT", "6"), ("SENTIFLOW_BRANCHES", "5")]);
    let opts = build_opts(&cli, &dir, lookup).unwrap();

    assert_eq!(opts.limit, 9);
    assert_eq!(opts.branches, 5);
    assert_eq!(opts.progress_every, 7);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_build_opts_explicit_config_must_exist() {
    let dir = scratch_dir("explicit");
    let cli = Cli {
        config: Some(dir.join("missing.toml")),
        ..Default::default()
    };
    let err = build_opts(&cli, &dir, no_env).unwrap_err();
    assert!(format!("{:#}", err).contains("missing.toml"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_build_opts_keep_going_flag() {
    let cli = Cli {
        keep_going: Some(true),
        ..Default::default()
    };
    let opts = build_opts(&cli, Path::new("/nonexistent-dir"), no_env).unwrap();
    assert_eq!(opts.error_policy, ErrorPolicy::Continue);
}

#[test]
fn test_build_opts_rejects_zero_limit() {
    let cli = Cli {
        limit: Some(0),
        ..Default::default()
    };
    let err = build_opts(&cli, Path::new("/nonexistent-dir"), no_env).unwrap_err();
    assert!(err.to_string().contains("limit"));
}

#[test]
fn test_opts_validate() {
    assert!(Opts::default().validate().is_ok());
    let opts = Opts {
        branches: 0,
        ..Default::default()
    };
    assert!(opts.validate().is_err());
    let opts = Opts {
        progress_every: 0,
        ..Default::default()
    };
    assert!(opts.validate().is_err());
}

// --- run / run_posts ---

fn sample_input() -> String {
    let mut lines = Vec::new();
    for i in 1..=10 {
        if i == 6 {
            lines.push("y".repeat(300));
        } else {
            lines.push(format!("post {i} about #Topic{} with @user{i}", i % 3));
        }
    }
    lines.join("\n")
}

#[test]
fn test_run_collects_tagged_posts() {
    let input = "hello #World\n\nbye   @Bob\n";
    let opts = Opts {
        limit: 2,
        branches: 2,
        ..Default::default()
    };
    let seen = Arc::new(Mutex::new(Vec::<Tagged>::new()));
    let sink_seen = Arc::clone(&seen);
    let report = run(
        LineFeed::from_reader(Cursor::new(input)),
        &opts,
        Some(move |t: Tagged| sink_seen.lock().unwrap().push(t)),
    )
    .unwrap();

    assert_eq!(report.summary.count, 2);
    assert_eq!(report.summary.reason, Termination::Completed);
    let mut seen = seen.lock().unwrap().clone();
    seen.sort_by_key(|t| t.id);
    assert_eq!(seen[0].hashtags, vec!["world"]);
    assert_eq!(seen[1].text, "bye @Bob");
    assert_eq!(seen[1].mentions, vec!["bob"]);
}

#[test]
fn test_run_posts_keep_going_reports_bad_post() {
    let ctx = CancelToken::new();
    let opts = Opts {
        limit: 3,
        branches: 3,
        error_policy: ErrorPolicy::Continue,
        ..Default::default()
    };
    let report = run_posts(
        &ctx,
        LineFeed::from_reader(Cursor::new(sample_input())),
        &opts,
        RunHooks::default(),
    )
    .unwrap();

    assert_eq!(report.summary.count, 9);
    assert_eq!(report.summary.errors, 1);
    assert_eq!(report.summary.reason, Termination::Completed);
    assert_eq!(report.steps.len(), 4);
    assert_eq!(report.steps[0].name, "normalize");
    assert_eq!(report.steps[0].failed, 1);
    assert_eq!(report.split.total(), 9);
    assert_eq!(report.merged, 9);
    let generator = report.generator.unwrap();
    assert_eq!(generator.emitted, 10);
    assert_eq!(generator.outcome, FeedOutcome::Exhausted);
}

#[test]
fn test_run_posts_bad_post_cancels_by_default() {
    let ctx = CancelToken::new();
    let opts = Opts {
        limit: 2,
        ..Default::default()
    };
    let report = run_posts(
        &ctx,
        LineFeed::from_reader(Cursor::new(sample_input())),
        &opts,
        RunHooks::default(),
    )
    .unwrap();

    assert!(report.summary.reason.is_cancelled());
    assert!(ctx.reason().unwrap().contains("post #6"));
    assert!(report.summary.count <= 9);
}

#[test]
fn test_run_posts_progress_hook() {
    let ctx = CancelToken::new();
    let opts = Opts {
        progress_every: 2,
        ..Default::default()
    };
    let marks = Arc::new(Mutex::new(Vec::new()));
    let m = Arc::clone(&marks);
    let hooks = RunHooks {
        on_progress: Some(Box::new(move |n: u64| m.lock().unwrap().push(n))),
        ..Default::default()
    };
    let report = run_posts(&ctx, IterFeed::new((1..=5).map(|i| post(i, "ok"))), &opts, hooks)
        .unwrap();
    assert_eq!(report.summary.count, 5);
    assert_eq!(*marks.lock().unwrap(), vec![2, 4]);
}

#[test]
fn test_run_posts_rendezvous_channels() {
    let ctx = CancelToken::new();
    let opts = Opts {
        channel_capacity: Some(0),
        limit: 2,
        ..Default::default()
    };
    let feed = IterFeed::new((1..=50).map(|i| post(i, "#a @b")));
    let report = run_posts(&ctx, feed, &opts, RunHooks::default()).unwrap();
    assert_eq!(report.summary.count, 50);
    assert_eq!(report.summary.reason, Termination::Completed);
}

#[test]
fn test_run_posts_invalid_opts_fail_fast() {
    let ctx = CancelToken::new();
    let opts = Opts {
        branches: 0,
        ..Default::default()
    };
    let feed = IterFeed::new(Vec::<Post>::new());
    assert!(run_posts(&ctx, feed, &opts, RunHooks::default()).is_err());
}

#[test]
fn test_feed_failure_is_not_a_clean_run() {
    let ctx = CancelToken::new();
    let feed = TryIterFeed::new(vec![
        Ok(post(1, "still here")),
        Err(anyhow::anyhow!("socket closed")),
        Ok(post(3, "never read")),
    ]);
    let report = run_posts(&ctx, feed, &Opts::default(), RunHooks::default()).unwrap();

    assert_eq!(report.summary.count, 1);
    assert_eq!(report.summary.reason, Termination::Completed);
    let generator = report.generator.as_ref().unwrap();
    assert!(matches!(generator.outcome, FeedOutcome::Failed(_)));

    let err = ensure_clean_run(&report).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("feed failed after 1 posts"));
    assert!(msg.contains("socket closed"));
}

#[test]
fn test_cancelled_run_is_not_a_clean_run() {
    let ctx = CancelToken::new();
    ctx.cancel("interrupted");
    let feed = IterFeed::new((1..=3).map(|i| post(i, "x")));
    let report = run_posts(&ctx, feed, &Opts::default(), RunHooks::default()).unwrap();
    let err = ensure_clean_run(&report).unwrap_err();
    assert!(err.to_string().contains("run cancelled: interrupted"));
}
