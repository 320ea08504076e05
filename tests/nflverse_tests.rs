//! nflverse client tests against a mock HTTP server.

use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nfl_epa_features::config::{RateLimitConfig, SourcesConfig};
use nfl_epa_features::data::nflverse::NflverseClient;
use nfl_epa_features::data::{PlaySource, ScheduleSource};
use nfl_epa_features::error::{is_data_unavailable, DataError};

const PBP_2022: &str = "\
play_id,game_id,home_team,away_team,week,posteam,defteam,home_score,away_score,rush_attempt,pass_attempt,epa,season
1,2022_01_KC_ARI,ARI,KC,1,,,21,44,NA,NA,NA,2022
40,2022_01_KC_ARI,ARI,KC,1,KC,ARI,21,44,1,0,0.42,2022
41,2022_01_KC_ARI,ARI,KC,1,KC,ARI,21,44,0,1,1.10,2022
";

const PBP_2023: &str = "\
play_id,game_id,home_team,away_team,week,posteam,defteam,home_score,away_score,rush_attempt,pass_attempt,epa,season
12,2023_01_DET_KC,KC,DET,1,DET,KC,20,21,0,1,-0.35,2023
";

const PBP_HEADER_ONLY: &str = "\
play_id,game_id,home_team,away_team,week,posteam,defteam,home_score,away_score,rush_attempt,pass_attempt,epa,season
";

const GAMES: &str = "\
game_id,season,game_type,week,away_team,away_score,home_team,home_score,result
2022_01_KC_ARI,2022,REG,1,KC,44,ARI,21,-23
2023_01_DET_KC,2023,REG,1,DET,21,KC,20,-1
2023_02_KC_JAX,2023,REG,2,KC,17,JAX,9,-8
";

fn client(server: &MockServer, max_retries: u32) -> NflverseClient {
    let sources = SourcesConfig {
        pbp_url_template: format!("{}/pbp/play_by_play_{{season}}.csv", server.uri()),
        schedule_url: format!("{}/games.csv", server.uri()),
        timeout_seconds: 5,
        user_agent: "nfl-epa-features-test".to_string(),
        max_retries,
    };
    let rate_limit = RateLimitConfig {
        requests_per_second: 100,
        burst_size: 100,
        backoff_base_ms: 1,
        backoff_max_ms: 5,
    };
    NflverseClient::new(sources, rate_limit).expect("should build client")
}

async fn serve(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn fetches_seasons_in_order() {
    let server = MockServer::start().await;
    serve(&server, "/pbp/play_by_play_2022.csv", PBP_2022).await;
    serve(&server, "/pbp/play_by_play_2023.csv", PBP_2023).await;

    let plays = assert_ok!(client(&server, 0).fetch_plays(&[2022, 2023]).await);

    assert_eq!(plays.len(), 4);
    assert!(plays[..3].iter().all(|p| p.season == 2022));
    assert_eq!(plays[3].season, 2023);
    assert_eq!(plays[0].posteam, None);
    assert_eq!(plays[1].posteam.as_deref(), Some("KC"));
    assert!(plays[1].rush_attempt);
    assert_eq!(plays[2].epa, Some(1.10));
}

#[tokio::test]
async fn unpublished_season_is_reported() {
    let server = MockServer::start().await;
    serve(&server, "/pbp/play_by_play_2022.csv", PBP_2022).await;
    Mock::given(method("GET"))
        .and(path("/pbp/play_by_play_2023.csv"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    // Missing releases are not retried
    let err = assert_err!(client(&server, 3).fetch_plays(&[2022, 2023]).await);

    assert!(is_data_unavailable(&err));
    match err.downcast_ref::<DataError>() {
        Some(DataError::NotPublished { season, status, .. }) => {
            assert_eq!(*season, 2023);
            assert_eq!(*status, 404);
        }
        other => panic!("expected NotPublished, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_season_is_reported() {
    let server = MockServer::start().await;
    serve(&server, "/pbp/play_by_play_2023.csv", PBP_HEADER_ONLY).await;

    let err = assert_err!(client(&server, 0).fetch_plays(&[2023]).await);
    assert!(matches!(
        err.downcast_ref::<DataError>(),
        Some(DataError::EmptySeason { season: 2023, .. })
    ));
}

#[tokio::test]
async fn server_errors_are_retried_then_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pbp/play_by_play_2023.csv"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = assert_err!(client(&server, 2).fetch_plays(&[2023]).await);
    assert!(matches!(
        err.downcast_ref::<DataError>(),
        Some(DataError::Unreachable { season: 2023, .. })
    ));
}

#[tokio::test]
async fn schedule_is_narrowed_to_season() {
    let server = MockServer::start().await;
    serve(&server, "/games.csv", GAMES).await;

    let games = assert_ok!(client(&server, 0).fetch_schedule(2023).await);

    assert_eq!(games.len(), 2);
    assert_eq!(games[0].week, 1);
    assert_eq!(games[0].home_team, "KC");
    assert_eq!(games[0].away_team, "DET");
    assert_eq!(games[0].result, Some(-1.0));
    assert_eq!(games[1].home_team, "JAX");
}

#[tokio::test]
async fn schedule_without_season_is_empty() {
    let server = MockServer::start().await;
    serve(&server, "/games.csv", GAMES).await;

    let err = assert_err!(client(&server, 0).fetch_schedule(2030).await);
    assert!(is_data_unavailable(&err));
}
