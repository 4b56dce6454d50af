use anyhow::{Context, Result};
use pg_test_db::fixtures::tables::{CompaniesTable, Company, MetaTable};
use pg_test_db::fixtures::TestTable;
use pg_test_db::logging::init_tracing;
use pg_test_db::{with_test_database, HarnessConfig};

fn main() -> Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    init_tracing();

    let config = HarnessConfig::from_env().context("loading settings")?;
    println!(
        "Provisioning {} on {}:{} ...",
        config.test_database_name(),
        config.settings.host,
        config.settings.port
    );

    let tables = with_test_database(config, |db| async move {
        println!("✓ Created {} and loaded fixtures", db.name());

        let mut conn = db.connect().await?;
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT table_name::text FROM information_schema.tables WHERE table_schema = 'public' ORDER BY table_name",
        )
        .fetch_all(&mut *conn)
        .await?;

        for (table, expected) in [
            (CompaniesTable::table_name(), CompaniesTable::seeded_rows()),
            (MetaTable::table_name(), MetaTable::seeded_rows()),
        ] {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&mut *conn)
                .await?;
            println!("  - {}: {} rows (expected {})", table, count, expected);
            anyhow::ensure!(count == expected, "{} holds {} rows, expected {}", table, count, expected);
        }

        let companies: Vec<Company> = sqlx::query_as("SELECT id, json, created_at FROM cnpj ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;
        for company in &companies {
            println!("  {}", serde_json::to_string(company)?);
        }

        conn.close().await?;
        Ok::<_, anyhow::Error>(tables)
    })
    .await?;

    println!("✓ Tables: {}", tables.join(", "));
    println!("✓ Test database dropped");
    Ok(())
}
