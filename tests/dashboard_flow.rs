use rust_xlsxwriter::Workbook;
use tempfile::TempDir;

use tabdeck::account::AccountContext;
use tabdeck::dashboard::{self, Dashboard, UploadFile};
use tabdeck::decoder::decode;
use tabdeck::docstore::{DocumentStore, MemoryStore};
use tabdeck::jsondb::JsonDirStore;
use tabdeck::render::{RenderDecision, render_card};
use tabdeck::value::FieldValue;

fn people_csv() -> UploadFile {
    UploadFile::new("data.csv", b"name,age\nAlice,30\nBob,25\n".to_vec())
}

fn xlsx_bytes() -> Vec<u8> {
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "name").unwrap();
        sheet.write_string(0, 1, "age").unwrap();
        sheet.write_string(1, 0, "Alice").unwrap();
        sheet.write_number(1, 1, 30).unwrap();
        // row 2 left blank
        sheet.write_string(3, 0, "Bob").unwrap();
        sheet.write_number(3, 1, 2.5).unwrap();
    }
    {
        let other = workbook.add_worksheet();
        other.write_string(0, 0, "ignored").unwrap();
        other.write_string(1, 0, "x").unwrap();
    }
    workbook.save_to_buffer().unwrap()
}

#[tokio::test]
async fn upload_search_delete_scenario() {
    let store = MemoryStore::new();
    let account = AccountContext::new("alice-uid");
    let mut view = Dashboard::new();

    view.upload(&store, &account, &people_csv()).await;
    assert!(!view.status().unwrap().is_error());
    assert_eq!(view.visible().len(), 1);
    assert_eq!(view.visible()[0].file_name, "data.csv");
    assert_eq!(view.visible()[0].records.len(), 2);

    let first = &view.visible()[0].records[0];
    let keys: Vec<&str> = first.keys().collect();
    assert_eq!(keys, vec!["createdAt", "name", "age"]);
    assert!(matches!(first.get("createdAt"), Some(FieldValue::Timestamp(_))));

    view.type_search("alice");
    // Typing alone leaves the shown groups untouched
    assert_eq!(view.visible()[0].records.len(), 2);
    let shown = view.commit_search();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].records.len(), 1);
    assert_eq!(shown[0].records[0].get("name"), Some(&FieldValue::from("Alice")));

    view.type_search("zzz");
    assert!(view.commit_search().is_empty());

    view.type_search("");
    assert_eq!(view.commit_search().len(), 1);

    view.delete(&store, &account, "data.csv").await;
    assert!(view.visible().is_empty());
    assert!(view.records().groups().is_empty());
    assert!(store.list_files(&account).await.unwrap().is_empty());
}

#[tokio::test]
async fn replace_refetches_with_new_name() {
    let store = MemoryStore::new();
    let account = AccountContext::new("u");
    let mut view = Dashboard::new();

    view.upload(&store, &account, &people_csv()).await;
    let replacement = UploadFile::new("people.tsv", b"name\tcity\nCarol\tOslo\n".to_vec());
    view.replace(&store, &account, "data.csv", &replacement).await;

    assert_eq!(view.file_names(), ["people.tsv".to_string()]);
    let group = &view.visible()[0];
    assert_eq!(group.file_name, "people.tsv");
    assert_eq!(group.records[0].get("city"), Some(&FieldValue::from("Oslo")));
}

#[tokio::test]
async fn accounts_do_not_see_each_other() {
    let store = MemoryStore::new();
    let alice = AccountContext::new("alice");
    let bob = AccountContext::new("bob");

    dashboard::upload(&store, &alice, &people_csv()).await.unwrap();
    assert!(dashboard::fetch_groups(&store, &bob).await.unwrap().is_empty());
    assert_eq!(dashboard::fetch_groups(&store, &alice).await.unwrap().len(), 1);
}

#[tokio::test]
async fn json_dir_store_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let account = AccountContext::new("u1");
    {
        let store = JsonDirStore::open(tmp.path()).await.unwrap();
        dashboard::upload(&store, &account, &people_csv()).await.unwrap();
    }

    let store = JsonDirStore::open(tmp.path()).await.unwrap();
    let groups = dashboard::fetch_groups(&store, &account).await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].records.len(), 2);
    assert_eq!(groups[0].records[1].get("name"), Some(&FieldValue::from("Bob")));
}

#[test]
fn xlsx_reads_first_sheet_only() {
    let rows = decode("book.xlsx", &xlsx_bytes()).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("name"), Some(&FieldValue::from("Alice")));
    assert_eq!(rows[0].get("age"), Some(&FieldValue::Int(30)));
    assert_eq!(rows[1].get("age"), Some(&FieldValue::Float(2.5)));
    assert!(rows.iter().all(|row| !row.contains_key("ignored")));
}

#[tokio::test]
async fn uploaded_xlsx_renders_as_cards() {
    let store = MemoryStore::new();
    let account = AccountContext::new("u");
    let file = UploadFile::new("book.xlsx", xlsx_bytes());
    let receipt = dashboard::upload(&store, &account, &file).await.unwrap();
    assert_eq!(receipt.rows, 2);

    let groups = dashboard::fetch_groups(&store, &account).await.unwrap();
    let card = render_card(&groups[0].records[0]);
    assert_eq!(card[0].label, "createdAt");
    assert!(matches!(card[0].decision, RenderDecision::Timestamp(_)));
    assert_eq!(card[1].decision, RenderDecision::PlainText("Alice".into()));
    assert_eq!(card[2].decision, RenderDecision::PlainText("30".into()));
}

#[tokio::test]
async fn rejected_replacement_keeps_old_file_and_view_in_step() {
    let tmp = TempDir::new().unwrap();
    let store = JsonDirStore::open(tmp.path()).await.unwrap();
    let account = AccountContext::new("u1");
    let mut view = Dashboard::new();

    view.upload(&store, &account, &people_csv()).await;
    let bad_name = UploadFile::new("sub/new.csv", b"name\nCarol\n".to_vec());
    view.replace(&store, &account, "data.csv", &bad_name).await;

    assert!(view.status().unwrap().is_error());
    assert_eq!(store.list_files(&account).await.unwrap(), vec!["data.csv"]);
    let shown: Vec<&str> = view.visible().iter().map(|g| g.file_name.as_str()).collect();
    assert_eq!(shown, vec!["data.csv"]);
}

#[tokio::test]
async fn failed_replace_refetches_from_the_store() {
    let store = MemoryStore::new();
    let account = AccountContext::new("u");
    let mut view = Dashboard::new();

    // Written behind the view's back; only a re-fetch can show it
    dashboard::upload(&store, &account, &people_csv()).await.unwrap();
    let replacement = UploadFile::new("other.csv", b"k\nv\n".to_vec());
    view.replace(&store, &account, "ghost.csv", &replacement).await;

    assert_eq!(view.status().unwrap().text, dashboard::REPLACE_FAILED);
    assert_eq!(view.file_names(), ["data.csv".to_string()]);
}

#[tokio::test]
async fn good_refresh_replaces_fetch_error() {
    let tmp = TempDir::new().unwrap();
    let store = JsonDirStore::open(tmp.path()).await.unwrap();
    let good = AccountContext::new("u1");
    dashboard::upload(&store, &good, &people_csv()).await.unwrap();
    let mut view = Dashboard::new();

    view.refresh(&store, &AccountContext::new("..")).await;
    assert_eq!(view.status().unwrap().text, dashboard::FETCH_FAILED);

    view.refresh(&store, &good).await;
    assert_eq!(view.status(), None);
    assert_eq!(view.visible().len(), 1);
}
