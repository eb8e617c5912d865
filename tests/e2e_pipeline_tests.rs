//! End-to-end tests for the load pipeline
//!
//! Runs the song and log batches over on-disk fixture trees and checks the
//! resulting warehouse tables.

mod common;

use common::{
    page_event, play, song_record, TestDataset, ARTIST_1_ID, ARTIST_1_NAME, SONG_1_DURATION,
    SONG_1_ID, SONG_1_TITLE, TS_1, TS_2, TS_3, USER_1_ID, USER_2_ID,
};
use sparkify_etl::etl::{
    process_log_file, process_song_file, run_batch, run_pipeline, BatchOptions, EtlError,
    FileOutcome,
};
use sparkify_etl::warehouse::{Artist, Dataset, Song, SqliteWarehouse, TableCounts};
use std::path::Path;

fn load(dataset: &TestDataset, store: &SqliteWarehouse) -> sparkify_etl::etl::PipelineReport {
    run_pipeline(
        store,
        &dataset.song_root,
        &dataset.log_root,
        &BatchOptions::default(),
    )
    .unwrap()
}

// =============================================================================
// Song Files
// =============================================================================

#[test]
fn test_song_file_yields_artist_and_song_rows() {
    let dataset = TestDataset::empty().unwrap();
    dataset
        .write_song(
            "A/A/A/setanta.json",
            &song_record(SONG_1_ID, SONG_1_TITLE, ARTIST_1_ID, ARTIST_1_NAME, 210.5, 2005),
        )
        .unwrap();
    let store = dataset.open_store().unwrap();

    load(&dataset, &store);

    assert_eq!(
        store.get_artist(ARTIST_1_ID).unwrap(),
        Some(Artist {
            artist_id: ARTIST_1_ID.to_string(),
            name: ARTIST_1_NAME.to_string(),
            location: Some(String::new()),
            latitude: None,
            longitude: None,
        })
    );
    assert_eq!(
        store.get_song(SONG_1_ID).unwrap(),
        Some(Song {
            song_id: SONG_1_ID.to_string(),
            title: SONG_1_TITLE.to_string(),
            artist_id: ARTIST_1_ID.to_string(),
            year: 2005,
            duration: 210.5,
        })
    );
}

#[test]
fn test_song_processing_is_idempotent() {
    let dataset = TestDataset::empty().unwrap();
    let record = song_record(SONG_1_ID, SONG_1_TITLE, ARTIST_1_ID, ARTIST_1_NAME, 210.5, 2005);
    dataset.write_song("A/one.json", &record).unwrap();
    dataset.write_song("B/copy.json", &record).unwrap();
    let store = dataset.open_store().unwrap();

    // reload so both runs really process the files
    let options = BatchOptions {
        reload: true,
        ..Default::default()
    };
    for _ in 0..2 {
        let report = run_batch(
            &store,
            Dataset::Songs,
            &dataset.song_root,
            process_song_file,
            &options,
        )
        .unwrap();
        assert_eq!(report.loaded(), 2);
    }

    let counts = store.counts().unwrap();
    assert_eq!(counts.artists, 1);
    assert_eq!(counts.songs, 1);
}

// =============================================================================
// Log Files
// =============================================================================

#[test]
fn test_non_next_song_events_produce_no_rows() {
    let dataset = TestDataset::empty().unwrap();
    dataset
        .write_log(
            "2018/11/a.json",
            &[
                page_event("Home", TS_1, USER_1_ID),
                page_event("Settings", TS_2, USER_1_ID),
                page_event("Logout", TS_3, USER_2_ID),
            ],
        )
        .unwrap();
    let store = dataset.open_store().unwrap();

    let report = load(&dataset, &store);

    let logs = report.logs.unwrap();
    assert_eq!(logs.totals.records_filtered, 3);
    assert_eq!(store.counts().unwrap(), TableCounts::default());
}

#[test]
fn test_one_songplay_per_play_and_deduplicated_time_rows() {
    let dataset = TestDataset::empty().unwrap();
    dataset
        .write_log(
            "2018/11/a.json",
            &[
                play(TS_1, USER_1_ID, "free", "A", "B", 1.0),
                play(TS_1, USER_2_ID, "free", "C", "D", 2.0),
            ],
        )
        .unwrap();
    dataset
        .write_log(
            "2018/11/b.json",
            &[play(TS_1, USER_1_ID, "free", "E", "F", 3.0)],
        )
        .unwrap();
    let store = dataset.open_store().unwrap();

    load(&dataset, &store);

    let counts = store.counts().unwrap();
    assert_eq!(counts.songplays, 3);
    assert_eq!(counts.time, 1);
    assert_eq!(counts.users, 2);

    let time = store.get_time(TS_1).unwrap().unwrap();
    assert_eq!(
        (time.hour, time.day, time.week, time.month, time.year, time.weekday),
        (17, 5, 45, 11, 2018, 0)
    );
}

#[test]
fn test_user_level_reflects_last_processed_event() {
    let dataset = TestDataset::empty().unwrap();
    dataset
        .write_log(
            "2018/11/a.json",
            &[play(TS_1, USER_1_ID, "free", "A", "B", 1.0)],
        )
        .unwrap();
    dataset
        .write_log(
            "2018/11/b.json",
            &[
                play(TS_2, USER_1_ID, "paid", "A", "B", 1.0),
                play(TS_3, USER_1_ID, "free", "A", "B", 1.0),
            ],
        )
        .unwrap();
    let store = dataset.open_store().unwrap();

    load(&dataset, &store);

    let user = store.get_user(USER_1_ID).unwrap().unwrap();
    assert_eq!(user.level, "free");
    assert_eq!(user.first_name.as_deref(), Some("First15"));

    let levels: Vec<String> = store
        .list_songplays()
        .unwrap()
        .into_iter()
        .map(|p| p.level)
        .collect();
    assert_eq!(levels, vec!["free", "paid", "free"]);
}

#[test]
fn test_lookup_resolves_exact_matches_only() {
    let dataset = TestDataset::standard().unwrap();
    let store = dataset.open_store().unwrap();

    let report = load(&dataset, &store);

    let logs = report.logs.unwrap();
    assert_eq!(logs.totals.songplays, 3);
    assert_eq!(logs.totals.lookup_hits, 1);

    let plays = store.list_songplays().unwrap();
    assert_eq!(plays.len(), 3);

    // exact title, artist name and duration
    assert_eq!(plays[0].start_time, TS_1);
    assert_eq!(plays[0].song_id.as_deref(), Some(SONG_1_ID));
    assert_eq!(plays[0].artist_id.as_deref(), Some(ARTIST_1_ID));

    // unknown title
    assert_eq!(plays[1].song_id, None);
    assert_eq!(plays[1].artist_id, None);

    // known song, duration off by a fraction
    assert_eq!(plays[2].start_time, TS_3);
    assert_eq!(plays[2].song_id, None);
    assert_eq!(plays[2].artist_id, None);
}

#[test]
fn test_late_song_metadata_does_not_backfill() {
    let dataset = TestDataset::empty().unwrap();
    dataset
        .write_log(
            "2018/11/a.json",
            &[play(
                TS_1,
                USER_1_ID,
                "free",
                SONG_1_TITLE,
                ARTIST_1_NAME,
                SONG_1_DURATION,
            )],
        )
        .unwrap();
    let store = dataset.open_store().unwrap();
    load(&dataset, &store);

    dataset
        .write_song(
            "A/setanta.json",
            &song_record(
                SONG_1_ID,
                SONG_1_TITLE,
                ARTIST_1_ID,
                ARTIST_1_NAME,
                SONG_1_DURATION,
                2005,
            ),
        )
        .unwrap();
    load(&dataset, &store);

    let plays = store.list_songplays().unwrap();
    assert_eq!(plays.len(), 1);
    assert_eq!(plays[0].song_id, None);
}

#[test]
fn test_tied_lookup_picks_lowest_artist_id() {
    let dataset = TestDataset::empty().unwrap();
    dataset
        .write_song(
            "A/b.json",
            &song_record("SO2", "Twin", "ARB", "Same Name", 100.0, 2001),
        )
        .unwrap();
    dataset
        .write_song(
            "A/a.json",
            &song_record("SO1", "Twin", "ARA", "Same Name", 100.0, 2001),
        )
        .unwrap();
    dataset
        .write_log(
            "a.json",
            &[play(TS_1, USER_1_ID, "free", "Twin", "Same Name", 100.0)],
        )
        .unwrap();
    let store = dataset.open_store().unwrap();

    load(&dataset, &store);

    let plays = store.list_songplays().unwrap();
    assert_eq!(plays[0].artist_id.as_deref(), Some("ARA"));
    assert_eq!(plays[0].song_id.as_deref(), Some("SO1"));
}

// =============================================================================
// Batch Behaviour
// =============================================================================

#[test]
fn test_rerunning_pipeline_leaves_identical_state() {
    let dataset = TestDataset::standard().unwrap();
    let store = dataset.open_store().unwrap();

    load(&dataset, &store);
    let counts = store.counts().unwrap();
    let plays = store.list_songplays().unwrap();

    let second = load(&dataset, &store);

    assert_eq!(second.songs.already_loaded(), 2);
    assert_eq!(second.logs.as_ref().unwrap().already_loaded(), 1);
    assert_eq!(store.counts().unwrap(), counts);
    assert_eq!(store.list_songplays().unwrap(), plays);
}

#[test]
fn test_state_survives_reopening_the_database() {
    let dataset = TestDataset::standard().unwrap();
    {
        let store = dataset.open_store().unwrap();
        load(&dataset, &store);
    }

    let store = dataset.open_store().unwrap();
    let report = load(&dataset, &store);

    assert!(!report.has_failures());
    assert_eq!(report.songs.loaded(), 0);
    assert_eq!(store.counts().unwrap().songplays, 3);
}

#[test]
fn test_failing_file_does_not_block_others() {
    let dataset = TestDataset::standard().unwrap();
    dataset
        .write_raw_song("A/A/0/broken.json", "{\"song_id\": \"SOBROKEN\"")
        .unwrap();
    let store = dataset.open_store().unwrap();

    let report = load(&dataset, &store);

    assert!(report.has_failures());
    let failures: Vec<(&str, &EtlError)> = report.songs.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "A/A/0/broken.json");
    assert!(matches!(failures[0].1, EtlError::MalformedInput { .. }));

    assert_eq!(report.songs.loaded(), 2);
    assert_eq!(store.counts().unwrap().songplays, 3);
    assert!(store
        .loaded_file(Dataset::Songs, "A/A/0/broken.json")
        .unwrap()
        .is_none());
}

#[test]
fn test_fail_fast_skips_log_batch() {
    let dataset = TestDataset::standard().unwrap();
    dataset.write_raw_song("0/empty.json", "").unwrap();
    let store = dataset.open_store().unwrap();

    let options = BatchOptions {
        fail_fast: true,
        ..Default::default()
    };
    let report = run_pipeline(&store, &dataset.song_root, &dataset.log_root, &options).unwrap();

    assert!(report.has_failures());
    assert!(report.logs.is_none());
    assert_eq!(report.songs.files.len(), 1);
    assert!(report.summary().contains("logs: not run"));
    assert_eq!(store.counts().unwrap(), TableCounts::default());
}

#[test]
fn test_malformed_log_lines_are_skipped_not_fatal() {
    let dataset = TestDataset::empty().unwrap();
    let good = play(TS_1, USER_1_ID, "free", "A", "B", 1.0).to_string();
    dataset
        .write_raw_log(
            "2018/11/a.json",
            &format!("{}\n{{\"page\": \"NextSong\", \"ts\": \n\n{}\n", good, good),
        )
        .unwrap();
    let store = dataset.open_store().unwrap();

    let report = load(&dataset, &store);

    let logs = report.logs.unwrap();
    assert!(!logs.has_failures());
    match &logs.files[0].outcome {
        FileOutcome::Loaded(stats) => {
            assert_eq!(stats.records_read, 3);
            assert_eq!(stats.records_skipped, 1);
            assert_eq!(stats.songplays, 2);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_storage_failure_reports_file_and_line() {
    let dataset = TestDataset::empty().unwrap();
    dataset
        .write_log(
            "2018/11/a.json",
            &[
                play(TS_1, USER_1_ID, "free", "A", "B", 1.0),
                play(TS_2, USER_1_ID, "free", "C", "D", 2.0),
            ],
        )
        .unwrap();
    let store = dataset.open_store().unwrap();
    {
        let conn = rusqlite::Connection::open(&dataset.db_path).unwrap();
        conn.execute_batch(&format!(
            "CREATE TRIGGER reject_play BEFORE INSERT ON songplays
             WHEN NEW.start_time = {}
             BEGIN SELECT RAISE(ABORT, 'disk gone'); END;",
            TS_2
        ))
        .unwrap();
    }

    let report = run_batch(
        &store,
        Dataset::Logs,
        &dataset.log_root,
        process_log_file,
        &BatchOptions::default(),
    )
    .unwrap();

    assert!(report.has_failures());
    let summary = report.summary();
    assert!(summary.contains("FAILED 2018/11/a.json"), "{}", summary);
    assert!(summary.contains("at line 2"), "{}", summary);
    assert!(summary.contains("disk gone"), "{}", summary);
    // The whole file was rolled back
    assert_eq!(store.counts().unwrap(), TableCounts::default());
}

#[test]
fn test_processors_run_directly_on_a_transaction() {
    let store = SqliteWarehouse::in_memory().unwrap();
    let song = song_record(SONG_1_ID, SONG_1_TITLE, ARTIST_1_ID, ARTIST_1_NAME, 210.5, 2005);
    let log = play(TS_1, USER_1_ID, "free", SONG_1_TITLE, ARTIST_1_NAME, 210.5);

    let stats = store
        .with_file_transaction(|conn| -> Result<_, EtlError> {
            process_song_file(conn, Path::new("song.json"), &song.to_string())?;
            process_log_file(conn, Path::new("log.json"), &log.to_string())
        })
        .unwrap();

    assert_eq!(stats.lookup_hits, 1);
    assert_eq!(store.list_songplays().unwrap()[0].song_id.as_deref(), Some(SONG_1_ID));
}

#[test]
fn test_missing_data_root_is_reported() {
    let dataset = TestDataset::empty().unwrap();
    let store = dataset.open_store().unwrap();

    let result = run_pipeline(
        &store,
        &dataset.song_root.join("missing"),
        &dataset.log_root,
        &BatchOptions::default(),
    );

    assert!(matches!(result, Err(EtlError::MissingRoot(_))));
}

#[test]
fn test_missing_log_root_keeps_committed_songs() {
    let dataset = TestDataset::standard().unwrap();
    let store = dataset.open_store().unwrap();

    let report = run_pipeline(
        &store,
        &dataset.song_root,
        &dataset.log_root.join("missing"),
        &BatchOptions::default(),
    )
    .unwrap();

    assert_eq!(report.songs.loaded(), 2);
    assert!(matches!(report.logs_error, Some(EtlError::MissingRoot(_))));
    assert!(report.has_failures());
    assert_eq!(store.counts().unwrap().songs, 2);
}
