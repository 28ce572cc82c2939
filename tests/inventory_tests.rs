use rustle_adhoc::error::InventoryError;
use rustle_adhoc::inventory::scoped_pattern;
use rustle_adhoc::{AnsibleInventory, Inventory, SessionConfig, StaticInventory};
use serde_json::json;

fn create_test_inventory() -> StaticInventory {
    let listing = json!({
        "_meta": {
            "hostvars": {
                "web-01": {"ansible_host": "192.168.1.10"},
                "web-02": {"ansible_host": "192.168.1.11"},
                "db-01": {"ansible_host": "192.168.1.20"}
            }
        },
        "all": {"children": ["ungrouped", "webservers", "databases"]},
        "webservers": {"hosts": ["web-01", "web-02"]},
        "databases": {"hosts": ["db-01"], "vars": {"port": 5432}},
        "production": {"children": ["webservers", "databases"]}
    });
    StaticInventory::from_ansible_json(&listing).unwrap()
}

#[tokio::test]
async fn test_trait_resolves_patterns() {
    let inventory = create_test_inventory();

    assert_eq!(
        inventory.hosts("webservers:databases").await.unwrap(),
        vec!["db-01", "web-01", "web-02"]
    );
    assert_eq!(
        inventory.hosts("production:!databases").await.unwrap(),
        vec!["web-01", "web-02"]
    );
    assert_eq!(inventory.hosts("web-*").await.unwrap(), vec!["web-01", "web-02"]);
    assert_eq!(inventory.hosts("~db-\\d+").await.unwrap(), vec!["db-01"]);
}

#[tokio::test]
async fn test_comma_pattern_terms() {
    let inventory = create_test_inventory();

    assert_eq!(
        inventory.hosts("web-01,db-01").await.unwrap(),
        vec!["db-01", "web-01"]
    );
    assert_eq!(
        inventory.hosts("production,&webservers,!web-02").await.unwrap(),
        vec!["web-01"]
    );
    assert_eq!(
        scoped_pattern("production", "web-01,db-01"),
        "production:&(web-01,db-01)"
    );
}

#[tokio::test]
async fn test_groups_listing() {
    let groups = create_test_inventory().groups().await.unwrap();
    for expected in ["all", "databases", "production", "ungrouped", "webservers"] {
        assert!(groups.contains(&expected.to_string()), "missing {expected}");
    }
}

#[tokio::test]
async fn test_document_round_trips_through_listing() {
    let inventory = create_test_inventory();
    let doc = inventory.to_document();

    assert_eq!(doc["all"]["hosts"]["db-01"]["ansible_host"], json!("192.168.1.20"));
    assert_eq!(doc["all"]["children"]["databases"]["vars"]["port"], json!(5432));
}

#[tokio::test]
async fn test_open_missing_inventory_file() {
    let err = AnsibleInventory::open(
        "/definitely/not/here/inventory.ini",
        &SessionConfig::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, InventoryError::FileNotFound { .. }));
}

#[tokio::test]
async fn test_open_missing_executable() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let config = SessionConfig {
        ansible_command: "rustle-adhoc-no-such-ansible".to_string(),
        ..SessionConfig::default()
    };

    let err = AnsibleInventory::open(file.path(), &config).await.unwrap_err();
    assert!(matches!(err, InventoryError::ExecutableNotFound { .. }));
}
