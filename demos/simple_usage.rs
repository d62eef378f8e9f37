//! Walks through the core write/query/delete/drop cycle against a single
//! `Engine` instance rooted at a temp directory.

use nsdb_core::core::config::Config;
use nsdb_core::{Engine, EngineResponse};
use std::sync::Arc;

fn print_rows(label: &str, response: EngineResponse) {
    match response {
        EngineResponse::Rows(rows) => {
            println!("{label}: {} row(s)", rows.len());
            for row in rows {
                println!("  {row:?}");
            }
        }
        EngineResponse::Ack => println!("{label}: ok"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let dir = tempfile::tempdir()?;
    let config = Config {
        base_path: dir.path().to_path_buf(),
        ..Config::default()
    };
    let engine = Arc::new(Engine::new(config));
    engine.start();

    engine.execute(
        "demo",
        "metrics",
        "INSERT INTO requests TS 1000 DIM (path='/api/login') TAGS (city='atlanta') VAL 12.5",
    )?;
    engine.execute(
        "demo",
        "metrics",
        "INSERT INTO requests TS 2000 DIM (path='/api/login') TAGS (city='boston') VAL 20.0",
    )?;
    engine.execute(
        "demo",
        "metrics",
        "INSERT INTO requests TS 3000 DIM (path='/api/logout') TAGS (city='atlanta') VAL 5.0",
    )?;

    engine.flush_now();

    print_rows(
        "all requests",
        engine.execute("demo", "metrics", "SELECT * FROM requests")?,
    );
    print_rows(
        "atlanta requests",
        engine.execute(
            "demo",
            "metrics",
            "SELECT * FROM requests WHERE city = 'atlanta'",
        )?,
    );
    print_rows(
        "count by city",
        engine.execute(
            "demo",
            "metrics",
            "SELECT count(*) FROM requests GROUP BY city",
        )?,
    );

    engine.execute(
        "demo",
        "metrics",
        "DELETE FROM requests WHERE path = '/api/logout'",
    )?;
    engine.flush_now();
    print_rows(
        "after deleting logout rows",
        engine.execute("demo", "metrics", "SELECT * FROM requests")?,
    );

    engine.shutdown().await?;
    Ok(())
}
