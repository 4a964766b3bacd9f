//! Integration tests for the HTTP portal fetcher
//!
//! These tests use wiremock to stand in for the directory portal and check
//! the token, search, pagination and detail-tab request flows.

use directory_sweep::config::PortalConfig;
use directory_sweep::crawler::{FetchError, Fetcher, HttpFetcher, PageOutcome};
use directory_sweep::prefix::{Alphabet, Prefix};
use directory_sweep::state::DetailTab;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LANDING: &str = "/web/site-pro";
const SEARCH: &str = "/web/site-pro/home";
const RESULTS: &str = "/web/site-pro/recherche/resultats";
const DETAIL: &str = "/web/site-pro/information-detaillees";
const ACTION: &str = "_mapportlet_javax.portlet.action";

fn landing_page(token: &str) -> String {
    format!(
        r#"<html><body>
        <form action="/web/site-pro/home?p_p_id=rechercheportlet&amp;p_auth={}" method="post">
            <input type="text" name="texttofind"/>
        </form>
        </body></html>"#,
        token
    )
}

fn card(identity: &str, name: &str) -> String {
    format!(
        r#"<div class="contenant_resultat">
            <div class="nom_prenom"><a href="/web/site-pro/recherche/resultats?_mapportlet_idRpps={identity}&amp;_mapportlet_siteId=9">{name}</a></div>
            <div class="profession">Infirmier</div>
            <div class="adresse">3 place du Marché 69002 Lyon</div>
        </div>"#
    )
}

fn result_page(cards: &[(&str, &str)]) -> String {
    let body: String = cards.iter().map(|(id, name)| card(id, name)).collect();
    format!("<html><body>{}</body></html>", body)
}

fn fetcher_for(server: &MockServer) -> HttpFetcher {
    let portal = PortalConfig::with_base_url(server.uri());
    HttpFetcher::new(Arc::new(portal), Duration::ZERO, "test-session")
        .expect("Failed to build fetcher")
}

fn prefix(value: &str) -> Prefix {
    Prefix::parse(value, &Alphabet::latin()).expect("valid prefix")
}

async fn mount_landing(server: &MockServer, token: &str) {
    Mock::given(method("GET"))
        .and(path(LANDING))
        .respond_with(ResponseTemplate::new(200).set_body_string(landing_page(token)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_search_sends_token_and_prefix() {
    let server = MockServer::start().await;
    mount_landing(&server, "TOKEN1").await;

    Mock::given(method("POST"))
        .and(path(SEARCH))
        .and(body_string_contains("p_auth=TOKEN1"))
        .and(body_string_contains("texttofind=dup"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(result_page(&[("810001", "DUPONT Marie"), ("810002", "DUPUIS Paul")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut fetcher = fetcher_for(&server);
    let mut handle = fetcher
        .submit_search(&prefix("dup"))
        .await
        .expect("search should succeed");

    assert_eq!(fetcher.session().token.as_deref(), Some("TOKEN1"));
    assert_eq!(fetcher.session().token_refreshes, 0);

    // Page 1 comes from the search response itself
    let outcome = fetcher.fetch_page(&mut handle, 1).await.unwrap();
    let PageOutcome::Records(cards) = outcome else {
        panic!("expected records on page 1");
    };
    assert_eq!(cards.len(), 2);
    assert_eq!(cards[0].identity, "810001");
    assert_eq!(cards[0].name, "DUPONT Marie");
    assert_eq!(cards[0].profession.as_deref(), Some("Infirmier"));
    assert_eq!(cards[1].identity, "810002");
}

#[tokio::test]
async fn test_search_refreshes_expired_token_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LANDING))
        .respond_with(ResponseTemplate::new(200).set_body_string(landing_page("STALE")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_landing(&server, "FRESH").await;

    Mock::given(method("POST"))
        .and(path(SEARCH))
        .and(body_string_contains("p_auth=STALE"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SEARCH))
        .and(body_string_contains("p_auth=FRESH"))
        .respond_with(ResponseTemplate::new(200).set_body_string(result_page(&[("810001", "MARTIN Luc")])))
        .mount(&server)
        .await;

    let mut fetcher = fetcher_for(&server);
    let result = fetcher.submit_search(&prefix("mar")).await;

    assert!(result.is_ok());
    assert_eq!(fetcher.session().token.as_deref(), Some("FRESH"));
    assert_eq!(fetcher.session().token_refreshes, 1);
}

#[tokio::test]
async fn test_search_fails_when_refresh_does_not_help() {
    let server = MockServer::start().await;
    mount_landing(&server, "TOKEN1").await;

    Mock::given(method("POST"))
        .and(path(SEARCH))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let mut fetcher = fetcher_for(&server);
    let result = fetcher.submit_search(&prefix("mar")).await;

    assert!(matches!(result, Err(FetchError::Http { status: 500 })));
}

#[tokio::test]
async fn test_missing_token_is_an_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LANDING))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>Maintenance</body></html>"))
        .mount(&server)
        .await;

    let mut fetcher = fetcher_for(&server);
    let result = fetcher.submit_search(&prefix("a")).await;

    assert!(matches!(result, Err(FetchError::Auth(_))));
    assert!(fetcher.session().token.is_none());
}

#[tokio::test]
async fn test_pagination_until_empty_page() {
    let server = MockServer::start().await;
    mount_landing(&server, "TOKEN1").await;

    Mock::given(method("POST"))
        .and(path(SEARCH))
        .respond_with(ResponseTemplate::new(200).set_body_string(result_page(&[("1", "BERNARD A")])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(RESULTS))
        .and(query_param("_resultatportlet_cur", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(result_page(&[("2", "BERNARD B")])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(RESULTS))
        .and(query_param("_resultatportlet_cur", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(result_page(&[])))
        .expect(1)
        .mount(&server)
        .await;

    let mut fetcher = fetcher_for(&server);
    let mut handle = fetcher.submit_search(&prefix("ber")).await.unwrap();

    let page1 = fetcher.fetch_page(&mut handle, 1).await.unwrap();
    let page2 = fetcher.fetch_page(&mut handle, 2).await.unwrap();
    let page3 = fetcher.fetch_page(&mut handle, 3).await.unwrap();

    assert!(matches!(page1, PageOutcome::Records(ref cards) if cards[0].identity == "1"));
    assert!(matches!(page2, PageOutcome::Records(ref cards) if cards[0].identity == "2"));
    assert_eq!(page3, PageOutcome::EndOfResults);
}

#[tokio::test]
async fn test_page_error_is_reported() {
    let server = MockServer::start().await;
    mount_landing(&server, "TOKEN1").await;

    Mock::given(method("POST"))
        .and(path(SEARCH))
        .respond_with(ResponseTemplate::new(200).set_body_string(result_page(&[("1", "PETIT A")])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(RESULTS))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut fetcher = fetcher_for(&server);
    let mut handle = fetcher.submit_search(&prefix("pet")).await.unwrap();
    fetcher.fetch_page(&mut handle, 1).await.unwrap();

    let result = fetcher.fetch_page(&mut handle, 2).await;
    match result {
        Err(e @ FetchError::Http { status: 503 }) => assert!(e.is_transient()),
        other => panic!("expected HTTP 503, got {:?}", other),
    }
}

#[tokio::test]
async fn test_detail_tabs_in_portal_order() {
    let server = MockServer::start().await;
    mount_landing(&server, "TOKEN1").await;

    Mock::given(method("POST"))
        .and(path(SEARCH))
        .respond_with(ResponseTemplate::new(200).set_body_string(result_page(&[("810001", "ROUX Anne")])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(RESULTS))
        .and(query_param(ACTION, "DetailsPPAction"))
        .and(query_param("_mapportlet_idRpps", "810001"))
        .and(query_param("p_auth", "TOKEN1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let tabs = [
        (RESULTS, "infoDetailPP", "situation"),
        (DETAIL, "detailsPPDossierPro", "dossier"),
        (DETAIL, "detailsPPDiplomes", "diplomas"),
        (DETAIL, "detailsPPPersonne", "personal"),
    ];
    for (tab_path, action, marker) in tabs {
        Mock::given(method("POST"))
            .and(path(tab_path))
            .and(query_param(ACTION, action))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("<div class=\"contenu_{}\">{}</div>", marker, marker)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let mut fetcher = fetcher_for(&server);
    let mut handle = fetcher.submit_search(&prefix("rou")).await.unwrap();
    let PageOutcome::Records(cards) = fetcher.fetch_page(&mut handle, 1).await.unwrap() else {
        panic!("expected records");
    };

    let mut context = fetcher.open_detail(&cards[0]).await.unwrap();
    assert_eq!(context.identity, "810001");

    for tab in DetailTab::ALL {
        let html = fetcher.fetch_tab(&context, tab).await.unwrap();
        assert!(html.contains(tab.name()));
        context.advance(tab).unwrap();
    }
    context.finish().unwrap();
}

#[tokio::test]
async fn test_out_of_order_tab_is_rejected_without_request() {
    let server = MockServer::start().await;
    mount_landing(&server, "TOKEN1").await;

    Mock::given(method("POST"))
        .and(path(SEARCH))
        .respond_with(ResponseTemplate::new(200).set_body_string(result_page(&[("810001", "ROUX Anne")])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(RESULTS))
        .and(query_param(ACTION, "DetailsPPAction"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(DETAIL))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let mut fetcher = fetcher_for(&server);
    let mut handle = fetcher.submit_search(&prefix("rou")).await.unwrap();
    let PageOutcome::Records(cards) = fetcher.fetch_page(&mut handle, 1).await.unwrap() else {
        panic!("expected records");
    };
    let context = fetcher.open_detail(&cards[0]).await.unwrap();

    // Dossier before Situation
    let result = fetcher.fetch_tab(&context, DetailTab::Dossier).await;
    assert!(matches!(result, Err(FetchError::Navigation(_))));
}
