//! End-to-end loader scenarios over in-memory collaborators

mod common;

use common::{day, key, midnight, Harness, BUCKET};
use podmetrics_common::types::{MetricType, Tier, Vendor};
use podmetrics_loader::ingest::locator::Stage;
use podmetrics_loader::ingest::MemoryProviderMapping;
use podmetrics_loader::LoaderError;
use uuid::Uuid;

const EPISODE: Uuid = Uuid::from_u128(0xE1);
const OTHER_EPISODE: Uuid = Uuid::from_u128(0xE2);
const PODCAST: Uuid = Uuid::from_u128(0xA1);

fn mapping() -> MemoryProviderMapping {
    MemoryProviderMapping::new()
        .with(Vendor::Art19, Tier::Episode, "ep-1", EPISODE)
        .with(Vendor::Art19, Tier::Episode, "ep-2", OTHER_EPISODE)
        .with(Vendor::Art19, Tier::Podcast, "pod-1", PODCAST)
        .with(Vendor::Megaphone, Tier::Episode, "mg-1", EPISODE)
        .with(Vendor::Omny, Tier::Episode, "om-1", EPISODE)
}

fn only(metric_type: MetricType) -> Vec<MetricType> {
    MetricType::MAPREDUCED
        .into_iter()
        .filter(|m| *m != metric_type)
        .collect()
}

#[tokio::test]
async fn test_overlapping_files_sum_then_override_replaces() {
    let h = Harness::new(mapping());
    h.put_result(
        "art19",
        MetricType::EpisodeDay,
        day(),
        Stage::Stage2,
        &[
            ("part-00000.gz", "ep-1\t2024-03-05T00:00:00Z\t3\n"),
            ("part-00001.bz2", "ep-1\t2024-03-05T00:00:00Z\t3\n"),
        ],
    );

    let report = h
        .loader(500, 500)
        .load_day(BUCKET, day(), &[], &[])
        .await
        .unwrap();
    assert_eq!(report.unit(MetricType::EpisodeDay).unwrap().compacted, 1);

    let k = key(EPISODE, midnight(day()), "DOWNLOADS", "total");
    let first = h.sink.get("episode_metrics_daily", &k).unwrap();
    assert_eq!(first.count, 6);
    assert_eq!(first.created_at, first.updated_at);

    h.add_override(Tier::Episode, EPISODE, "DOWNLOADS", "total", 10);
    h.loader(500, 500)
        .load_day(BUCKET, day(), &[], &[])
        .await
        .unwrap();

    let second = h.sink.get("episode_metrics_daily", &k).unwrap();
    assert_eq!(second.count, 10);
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at > first.updated_at);
}

#[tokio::test]
async fn test_rerunning_a_day_does_not_double_count() {
    let h = Harness::new(mapping());
    h.put_result(
        "art19",
        MetricType::EpisodeDay,
        day(),
        Stage::Stage2,
        &[("part-00000.gz", "ep-1\t2024-03-05T00:00:00Z\t4\n")],
    );

    for _ in 0..2 {
        h.loader(500, 500)
            .load_day(BUCKET, day(), &[], &[])
            .await
            .unwrap();
    }

    let rows = h.rows("episode_metrics_daily");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].count, 4);
}

#[tokio::test]
async fn test_rows_outside_the_day_are_never_staged() {
    let h = Harness::new(mapping());
    h.put_result(
        "art19",
        MetricType::EpisodeDay,
        day(),
        Stage::Stage2,
        &[(
            "part-00000.gz",
            "ep-1\t2024-03-05T00:00:00Z\t2\nep-2\t2024-03-06T00:00:00Z\t5\nep-2\t2024-03-04T23:00:00Z\t1\n",
        )],
    );

    let report = h
        .loader(500, 500)
        .load_day(BUCKET, day(), &[], &[])
        .await
        .unwrap();

    let unit = report.unit(MetricType::EpisodeDay).unwrap();
    assert_eq!(unit.ingest.out_of_day, 2);
    let rows = h.rows("episode_metrics_daily");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].tier_id, EPISODE);
}

#[tokio::test]
async fn test_unresolved_ids_are_dropped() {
    let h = Harness::new(mapping());
    h.put_result(
        "megaphone",
        MetricType::EpisodeDay,
        day(),
        Stage::Stage2,
        &[(
            "part-00000.gz",
            "999999\t2024-03-05T00:00:00Z\t8\nmg-1\t2024-03-05T00:00:00Z\t1\n",
        )],
    );

    let report = h
        .loader(500, 500)
        .load_day(BUCKET, day(), &[], &[])
        .await
        .unwrap();

    assert_eq!(report.unit(MetricType::EpisodeDay).unwrap().ingest.unresolved, 1);
    let rows = h.rows("episode_metrics_daily");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].count, 1);
}

#[tokio::test]
async fn test_stage2_wins_and_stage1_is_never_read() {
    let h = Harness::new(mapping());
    h.put_result(
        "art19",
        MetricType::EpisodeDay,
        day(),
        Stage::Stage1,
        &[("part-00000.gz", "ep-1\t2024-03-05T00:00:00Z\t100\n")],
    );
    h.put_result(
        "art19",
        MetricType::EpisodeDay,
        day(),
        Stage::Stage2,
        &[("part-00000.gz", "ep-1\t2024-03-05T00:00:00Z\t7\n")],
    );

    h.loader(500, 500)
        .load_day(BUCKET, day(), &[], &[])
        .await
        .unwrap();

    assert_eq!(h.rows("episode_metrics_daily")[0].count, 7);
    assert!(h.objects.reads().iter().all(|url| !url.contains("/stage1/")));
}

#[tokio::test]
async fn test_stage1_is_the_fallback() {
    let h = Harness::new(mapping());
    h.put_result(
        "art19",
        MetricType::EpisodeDay,
        day(),
        Stage::Stage1,
        &[("part-00000.gz", "ep-1\t2024-03-05T00:00:00Z\t5\n")],
    );
    // stage2 output without a marker is still being written
    h.put_object(
        "art19",
        MetricType::EpisodeDay,
        day(),
        Stage::Stage2,
        "part-00000.gz",
        "ep-1\t2024-03-05T00:00:00Z\t50\n",
    );

    h.loader(500, 500)
        .load_day(BUCKET, day(), &[], &[])
        .await
        .unwrap();

    assert_eq!(h.rows("episode_metrics_daily")[0].count, 5);
}

#[tokio::test]
async fn test_vendors_and_vendor_dirs_accumulate() {
    let h = Harness::new(mapping());
    h.put_result(
        "art19",
        MetricType::EpisodeDay,
        day(),
        Stage::Stage2,
        &[("part-00000.gz", "ep-1\t2024-03-05T00:00:00Z\t1\n")],
    );
    h.put_result(
        "megaphone",
        MetricType::EpisodeDay,
        day(),
        Stage::Stage1,
        &[("part-00000.bz2", "mg-1\t2024-03-05 00:00:00\t2\n")],
    );
    h.put_result(
        "omny",
        MetricType::EpisodeDay,
        day(),
        Stage::Stage2,
        &[("part-00000.gz", "om-1\t2024-03-05\t4\n")],
    );
    h.put_result(
        "omny-legacy",
        MetricType::EpisodeDay,
        day(),
        Stage::Stage2,
        &[("part-00000.gz", "om-1\t2024-03-05T00:00:00+00:00\t8\n")],
    );

    let report = h
        .loader(500, 500)
        .load_day(BUCKET, day(), &[], &[])
        .await
        .unwrap();

    assert_eq!(report.unit(MetricType::EpisodeDay).unwrap().locations, 4);
    let rows = h.rows("episode_metrics_daily");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].count, 15);
}

#[tokio::test]
async fn test_geographic_values_are_normalized() {
    let h = Harness::new(mapping());
    h.put_result(
        "art19",
        MetricType::EpisodeDayCity,
        day(),
        Stage::Stage2,
        &[(
            "part-00000.gz",
            "ep-1\t2024-03-05T00:00:00Z\t506\t3\nep-1\t2024-03-05T00:00:00Z\t000\t9\nep-1\t2024-03-05T00:00:00Z\t501\t1\n",
        )],
    );
    h.put_result(
        "art19",
        MetricType::PodcastDayCountry,
        day(),
        Stage::Stage2,
        &[("part-00000.gz", "pod-1\t2024-03-05T00:00:00Z\tde\t2\n")],
    );

    let report = h
        .loader(500, 500)
        .load_day(BUCKET, day(), &[], &[])
        .await
        .unwrap();

    assert_eq!(report.unit(MetricType::EpisodeDayCity).unwrap().ingest.unconvertible, 1);

    let cities: Vec<_> = h
        .rows("episode_metrics_daily")
        .into_iter()
        .map(|r| (r.category_code, r.value, r.count))
        .collect();
    assert_eq!(
        cities,
        vec![
            ("CITY".to_string(), "Boston (Manchester)".to_string(), 3),
            ("CITY".to_string(), "New York".to_string(), 1),
        ]
    );

    let countries = h.rows("podcast_metrics_daily");
    assert_eq!(countries[0].tier_id, PODCAST);
    assert_eq!(countries[0].category_code, "COUNTRY");
    assert_eq!(countries[0].value, "Germany");
}

#[tokio::test]
async fn test_empty_located_source_aborts_the_day() {
    let h = Harness::new(mapping());
    h.put_result(
        "art19",
        MetricType::PodcastDay,
        day(),
        Stage::Stage2,
        &[("part-00000.gz", "pod-1\t2024-03-05T00:00:00Z\t2\n")],
    );
    // marker with nothing behind it
    h.mark_complete("art19", MetricType::EpisodeDay, day(), Stage::Stage2);

    let result = h.loader(500, 500).load_day(BUCKET, day(), &[], &[]).await;

    match result {
        Err(LoaderError::NoSourceObjects { location }) => {
            assert!(location.ends_with("/stage2/episode_day/"));
        }
        other => panic!("expected NoSourceObjects, got {other:?}"),
    }
    // metric types compacted before the failure are kept
    assert_eq!(h.rows("podcast_metrics_daily").len(), 1);
    assert!(h.staging.live_tables().is_empty());
}

#[tokio::test]
async fn test_malformed_rows_abort_the_unit() {
    let h = Harness::new(mapping());
    h.put_result(
        "art19",
        MetricType::EpisodeDay,
        day(),
        Stage::Stage2,
        &[("part-00000.gz", "ep-1\t2024-03-05T00:00:00Z\tmany\n")],
    );

    let result = h
        .loader(500, 500)
        .load_day(BUCKET, day(), &[], &[])
        .await;

    assert!(matches!(result, Err(LoaderError::MalformedRow { line: 1, .. })));
    assert!(h.rows("episode_metrics_daily").is_empty());
    assert!(h.staging.live_tables().is_empty());
}

#[tokio::test]
async fn test_excluded_and_included_metric_types() {
    let h = Harness::new(mapping());
    h.put_result(
        "art19",
        MetricType::EpisodeDay,
        day(),
        Stage::Stage2,
        &[("part-00000.gz", "ep-1\t2024-03-05T00:00:00Z\t3\n")],
    );
    h.put_result(
        "art19",
        MetricType::EpisodeHour,
        day(),
        Stage::Stage2,
        &[(
            "part-00000.gz",
            "ep-1\t2024-03-05T13:00:00Z\t1\nep-1\t2024-03-05T14:00:00Z\t2\n",
        )],
    );

    let report = h
        .loader(500, 500)
        .load_day(BUCKET, day(), &[MetricType::EpisodeDay], &[MetricType::EpisodeHour])
        .await
        .unwrap();

    assert!(report.unit(MetricType::EpisodeDay).is_none());
    assert!(h.rows("episode_metrics_daily").is_empty());

    let hourly = h.rows("episode_metrics_hourly");
    assert_eq!(hourly.len(), 2);
    assert_eq!(hourly.iter().map(|r| r.count).sum::<i64>(), 3);
}

#[tokio::test]
async fn test_load_days_dedupes_and_sorts() {
    let h = Harness::new(mapping());
    let next = day().succ_opt().unwrap();
    h.put_result(
        "art19",
        MetricType::EpisodeDay,
        next,
        Stage::Stage2,
        &[("part-00000.gz", "ep-1\t2024-03-06T00:00:00Z\t9\n")],
    );

    let reports = h
        .loader(500, 500)
        .load_days(BUCKET, &[next, day(), next], &only(MetricType::EpisodeDay), &[])
        .await
        .unwrap();

    let days: Vec<_> = reports.iter().map(|r| r.day).collect();
    assert_eq!(days, vec![day(), next]);
    assert_eq!(reports[0].total_compacted(), 0);
    assert_eq!(reports[1].total_compacted(), 1);
    assert_eq!(h.rows("episode_metrics_daily")[0].timestamp, midnight(next));
}
