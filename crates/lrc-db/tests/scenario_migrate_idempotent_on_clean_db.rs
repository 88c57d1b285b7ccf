/// Migrating twice must be idempotent.
///
/// DB-backed test, skipped if LRC_DATABASE_URL is not set.
#[tokio::test]
async fn migrate_idempotent_on_clean_db() -> anyhow::Result<()> {
    let url = match std::env::var(lrc_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: LRC_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = lrc_db::connect(&url).await?;
    lrc_db::migrate(&pool).await?;
    lrc_db::migrate(&pool).await?;

    let st = lrc_db::status(&pool).await?;
    assert!(st.ok);
    assert!(st.has_ledger_table);
    assert!(st.has_balance_table);
    Ok(())
}
