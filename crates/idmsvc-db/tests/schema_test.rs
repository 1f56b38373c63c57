//! Integration tests for schema initialization using in-memory SurrealDB.

use surrealdb::Surreal;
use surrealdb::engine::local::Mem;

#[tokio::test]
async fn schema_migration_applies_successfully() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    idmsvc_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("INFO FOR DB").await.unwrap();
    let info: Option<surrealdb_types::Value> = result.take(0).unwrap();
    let info = info.expect("INFO FOR DB should return a value");
    let info_str = format!("{:?}", info);

    for table in [
        "domain",
        "idm_domain",
        "ca_cert",
        "server",
        "location",
        "hostconf_jwk",
        "_migration",
    ] {
        assert!(info_str.contains(table), "missing {table} table");
    }
}

#[tokio::test]
async fn migration_is_idempotent() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    idmsvc_db::run_migrations(&db).await.unwrap();
    idmsvc_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("SELECT * FROM _migration").await.unwrap();
    let records: Vec<surrealdb_types::Value> = result.take(0).unwrap();
    assert_eq!(records.len(), 1, "expected exactly one migration record");
}

#[tokio::test]
async fn unknown_domain_type_is_rejected() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    idmsvc_db::run_migrations(&db).await.unwrap();

    let result = db
        .query(
            "CREATE domain SET org_id = '12345', domain_name = 'ad.test', \
             domain_type = 'active-directory'",
        )
        .await
        .unwrap()
        .check();

    assert!(result.is_err(), "only rhel-idm domains may be stored");
}

#[tokio::test]
async fn empty_org_id_is_rejected() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    idmsvc_db::run_migrations(&db).await.unwrap();

    let result = db
        .query(
            "CREATE domain SET org_id = '', domain_name = 'ipa.test', \
             domain_type = 'rhel-idm'",
        )
        .await
        .unwrap()
        .check();

    assert!(result.is_err());
}
