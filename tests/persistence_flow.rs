use std::collections::BTreeSet;
use std::time::Duration;

use pagecraft::codec::{serialize_elements, serialize_frames};
use pagecraft::env::{
    window_channel, BrowserHistory, MemoryHistory, MemoryStorage, SessionStorage, WindowPort,
};
use pagecraft::persistence::{LAST_SAVED_URL_KEY, SAVED_PARAMS_KEY};
use pagecraft::{CustomProps, ElementMap, FrameElement, FrameHost, PageParams, SyncConfig, ROOT_FRAME};
use proptest::prelude::*;
use serde_json::json;
use url::Url;

fn top_with(storage: &MemoryStorage, url: &str) -> (FrameHost, MemoryHistory) {
    let history = MemoryHistory::new(Url::parse(url).unwrap());
    let mut host = FrameHost::top(
        SyncConfig::default(),
        Box::new(storage.clone()),
        Box::new(history.clone()),
    );
    host.boot();
    (host, history)
}

fn container(id: &str) -> FrameElement {
    FrameElement::new(id, "Container", true)
}

fn panel(id: &str) -> FrameElement {
    FrameElement::new(id, "Panel", false)
}

fn frames(names: &[&str]) -> String {
    serialize_frames(&names.iter().map(|name| name.to_string()).collect::<Vec<_>>())
}

#[test]
fn empty_url_boots_a_bare_root_frame() {
    let storage = MemoryStorage::new();
    let (host, history) = top_with(&storage, "https://builder.test/");

    let view = host.view();
    assert_eq!(view.frames, vec![ROOT_FRAME.to_string()]);
    assert_eq!(view.elements.len(), 1);
    assert!(view.elements_of(ROOT_FRAME).is_empty());
    assert_eq!(history.replace_count(), 0);
}

#[test]
fn shared_link_discards_previous_session_pages() {
    let storage = MemoryStorage::new();
    let mut stale = PageParams::new();
    stale.set("frames.pricing", "TopFrame");
    stale.set("elements.pricing", "TopFrame:Panel-3,Panel,10,10,false,%7B%7D");
    stale.set("theme", "dark");
    let mut writer = storage.clone();
    writer.set_item(SAVED_PARAMS_KEY, &stale.to_query());
    writer.set_item(LAST_SAVED_URL_KEY, "https://builder.test/somewhere-else");

    let mut shared = PageParams::new();
    shared.set("frames.home", "TopFrame");
    shared.set("elements.home", "TopFrame:Panel-1,Panel,20,40,false,%7B%7D");
    shared.set("utm_source", "mail");
    let url = format!("https://builder.test/?{}", shared.to_query());

    let (host, _) = top_with(&storage, &url);

    let persisted = host.persisted().unwrap();
    assert!(persisted.get("elements.pricing").is_none());
    assert!(persisted.get("theme").is_none());
    let session = PageParams::from_query(&storage.get_item(SAVED_PARAMS_KEY).unwrap());
    assert!(session.get("utm_source").is_none());
    assert_eq!(session.get("frames.home"), Some("TopFrame"));

    let element = &host.elements_of(ROOT_FRAME)[0];
    assert_eq!(element.id, "Panel-1");
    assert_eq!((element.x_percent, element.y_percent), (20.0, 40.0));
}

#[test]
fn reload_keeps_other_pages_from_the_session() {
    let storage = MemoryStorage::new();
    let (mut first, history) = top_with(&storage, "https://builder.test/pricing");
    first
        .add_element(ROOT_FRAME, "Panel", false, CustomProps::new())
        .unwrap();
    first.flush_now().unwrap();
    let saved_url = history.current_url();

    // navigate in-app to the home page
    let home = Url::parse("https://builder.test/").unwrap();
    first.note_navigation(&home).unwrap();
    let (mut second, _) = top_with(&storage, home.as_str());
    assert!(second.persisted().unwrap().get("elements.pricing").is_some());
    let id = second
        .add_element(ROOT_FRAME, "Panel", false, CustomProps::new())
        .unwrap();
    assert_eq!(id.as_deref(), Some("Panel-2"));

    // a reload of the saved pricing URL restores its elements
    let (reloaded, _) = top_with(&storage, saved_url.as_str());
    assert_eq!(reloaded.elements_of(ROOT_FRAME)[0].id, "Panel-1");
}

#[tokio::test(start_paused = true)]
async fn rapid_edits_coalesce_into_one_commit() {
    let storage = MemoryStorage::new();
    let (mut host, history) = top_with(&storage, "https://builder.test/");
    let writes_after_boot = storage.write_count(SAVED_PARAMS_KEY);

    let first = host
        .add_element(ROOT_FRAME, "Panel", false, CustomProps::new())
        .unwrap()
        .unwrap();
    tokio::time::advance(Duration::from_millis(50)).await;
    assert!(host.flush_due().is_none());

    host.add_element(ROOT_FRAME, "Panel", false, CustomProps::new())
        .unwrap();
    tokio::time::advance(Duration::from_millis(50)).await;
    host.move_element(ROOT_FRAME, &first, 10.0, 20.0).unwrap();
    tokio::time::advance(Duration::from_millis(100)).await;
    assert!(host.flush_due().is_none());
    assert_eq!(storage.write_count(SAVED_PARAMS_KEY), writes_after_boot);

    let report = host.settle().await.expect("a save was pending");
    assert_eq!(report.pages_written, vec!["home".to_string()]);
    assert_eq!(storage.write_count(SAVED_PARAMS_KEY), writes_after_boot + 1);
    assert_eq!(history.replace_count(), 1);
    assert_eq!(history.push_count(), 0);

    let params = PageParams::from_url(&history.current_url());
    let elements = params.get("elements.home").unwrap();
    assert!(elements.contains("Panel-1,Panel,10,20,false"));
    assert!(elements.contains("Panel-2,Panel,50,50,false"));
    assert!(host.settle().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn run_loop_saves_what_arrived_before_the_mailbox_closed() {
    let storage = MemoryStorage::new();
    let (mut host, history) = top_with(&storage, "https://builder.test/");
    let (port, mut mailbox) = window_channel("top");
    port.post_message(&json!({
        "type": "addElement",
        "frameName": "TopFrame",
        "componentName": "Panel",
        "isFrameOrContainer": false,
    }));
    port.post_message(&json!({"type": "frameAdded", "frameName": "Container-9"}));
    drop(port);

    host.run(&mut mailbox).await;

    assert!(host.next_save_deadline().is_none());
    let params = PageParams::from_url(&history.current_url());
    assert!(params.get("elements.home").unwrap().contains("Panel-1"));
    assert!(params.get("frames.home").unwrap().contains("Container-9"));
}

#[test]
fn disposing_cancels_the_pending_save() {
    let storage = MemoryStorage::new();
    let (mut host, history) = top_with(&storage, "https://builder.test/");
    host.add_element(ROOT_FRAME, "Panel", false, CustomProps::new())
        .unwrap();
    host.dispose();
    assert!(host.next_save_deadline().is_none());
    assert_eq!(history.replace_count(), 0);
}

#[test]
fn removing_a_frame_cascades_across_pages() {
    // home: TopFrame -> Container-1 -> Container-2
    let mut home = ElementMap::new();
    home.insert(ROOT_FRAME.into(), vec![container("Container-1")]);
    home.insert("Container-1".into(), vec![container("Container-2")]);
    home.insert("Container-2".into(), vec![]);
    let mut url_params = PageParams::new();
    url_params.set("frames.home", frames(&[ROOT_FRAME, "Container-1", "Container-2"]));
    url_params.set("elements.home", serialize_elements(&home));
    let url = format!("https://builder.test/?{}", url_params.to_query());

    // gallery: Container-2 -> Container-3, plus a panel that must survive
    let mut gallery = ElementMap::new();
    gallery.insert(ROOT_FRAME.into(), vec![panel("Panel-9")]);
    gallery.insert("Container-2".into(), vec![container("Container-3")]);
    gallery.insert("Container-3".into(), vec![panel("Panel-4")]);
    // docs holds a dangling reference to Container-3
    let mut docs = ElementMap::new();
    docs.insert(ROOT_FRAME.into(), vec![container("Container-3"), panel("Panel-5")]);

    let mut session = PageParams::new();
    session.set("frames.gallery", frames(&[ROOT_FRAME, "Container-2", "Container-3"]));
    session.set("elements.gallery", serialize_elements(&gallery));
    session.set("frames.docs", frames(&[ROOT_FRAME]));
    session.set("elements.docs", serialize_elements(&docs));

    let storage = MemoryStorage::new();
    let mut writer = storage.clone();
    writer.set_item(SAVED_PARAMS_KEY, &session.to_query());
    writer.set_item(LAST_SAVED_URL_KEY, &url);

    let (mut host, history) = top_with(&storage, &url);
    assert!(host.store().has_frame("Container-2"));

    host.remove_element(ROOT_FRAME, "Container-1").unwrap();

    assert_eq!(host.view().frames, vec![ROOT_FRAME.to_string()]);
    assert!(host.view().elements_of(ROOT_FRAME).is_empty());

    let removed: BTreeSet<&str> = ["Container-1", "Container-2", "Container-3"].into();
    let check = |params: &PageParams| {
        for (key, value) in params.iter() {
            for frame in &removed {
                assert!(!value.contains(frame), "{key} still mentions {frame}: {value}");
            }
        }
    };

    let persisted = host.persisted().unwrap();
    check(&persisted);
    check(&PageParams::from_url(&history.current_url()));
    assert!(persisted.get("frames.home").is_none());
    assert!(persisted.get("elements.gallery").unwrap().contains("Panel-9"));
    assert!(persisted.get("elements.docs").unwrap().contains("Panel-5"));

    host.flush_now().unwrap();
    check(&host.persisted().unwrap());
}

#[test]
fn origin_page_lists_survive_commits() {
    let storage = MemoryStorage::new();
    let (mut host, _) = top_with(&storage, "https://builder.test/");
    host.add_origin_page(1, "pricing").unwrap();
    host.add_origin_page(1, "pricing").unwrap();
    host.add_origin_page(1, "docs").unwrap();

    host.add_element(ROOT_FRAME, "Panel", false, CustomProps::new())
        .unwrap();
    host.flush_now().unwrap();

    assert_eq!(
        host.origin_pages(1).unwrap(),
        vec!["pricing".to_string(), "docs".to_string()]
    );
    assert!(host.origin_pages(2).unwrap().is_empty());
    assert_eq!(host.origins().unwrap().keys().copied().collect::<Vec<_>>(), vec![1]);
}

const PAGES: [&str; 3] = ["https://builder.test/", "https://builder.test/pricing", "https://builder.test/docs"];

proptest! {
    #[test]
    fn ids_stay_unique_across_pages(visits in prop::collection::vec((0usize..PAGES.len(), 1usize..4), 1..6)) {
        let storage = MemoryStorage::new();
        let mut seen = BTreeSet::new();
        let mut previous: Option<FrameHost> = None;

        for (page, adds) in visits {
            let url = Url::parse(PAGES[page]).unwrap();
            if let Some(mut host) = previous.take() {
                host.note_navigation(&url).unwrap();
            }
            let (mut host, _) = top_with(&storage, url.as_str());
            for _ in 0..adds {
                let id = host
                    .add_element(ROOT_FRAME, "Panel", false, CustomProps::new())
                    .unwrap()
                    .unwrap();
                prop_assert!(seen.insert(id.clone()), "duplicate id {}", id);
            }
            host.flush_now().unwrap();
            previous = Some(host);
        }
    }
}
