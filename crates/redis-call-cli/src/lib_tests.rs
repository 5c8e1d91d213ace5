//! Tests for the redis-call-cli library module.

use super::*;
use redis_call::MemoryStore;

async fn open(store: &MemoryStore) -> Connection {
    Connection::open(store, &Endpoint::default()).await.unwrap()
}

async fn run(command: Commands, conn: &mut Connection) -> Result<String, CliError> {
    let mut out = Vec::new();
    execute_command(&command, conn, &mut out).await?;
    Ok(String::from_utf8(out).unwrap())
}

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}

#[test]
fn test_cli_parsing() {
    let cli = parse(&["redis-queue", "--port", "6380", "push", "jobs", "{}", "--json"]);
    assert_eq!(cli.port, Some(6380));
    assert_eq!(
        cli.command,
        Commands::Push {
            queue: "jobs".to_string(),
            payload: "{}".to_string(),
            json: true,
        }
    );
    assert_eq!(cli.command.queue(), Some("jobs"));

    let cli = parse(&["redis-queue", "elements", "jobs", "--list", "backup"]);
    match cli.command {
        Commands::Elements { list, json, .. } => {
            assert_eq!(list, ListArg::Backup);
            assert!(!json);
        }
        other => panic!("Expected Elements command, got {:?}", other),
    }

    assert!(Cli::try_parse_from(["redis-queue", "delete"]).is_err());
}

#[test]
fn test_load_configuration_applies_overrides() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(
        file,
        "connection:\n  host: cache\n  port: 6390\nqueues:\n  jobs:\n    port: 7000\n"
    )
    .unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let cli = parse(&["redis-queue", "--config", &path, "list"]);
    let config = load_configuration(&cli).unwrap();
    assert_eq!(resolve_endpoint(&config, None), Endpoint::tcp("cache", 6390));
    assert_eq!(
        resolve_endpoint(&config, Some("jobs")),
        Endpoint::tcp("cache", 7000)
    );

    let cli = parse(&["redis-queue", "--config", &path, "--port", "6400", "list"]);
    let config = load_configuration(&cli).unwrap();
    assert_eq!(resolve_endpoint(&config, None), Endpoint::tcp("cache", 6400));

    let cli = parse(&["redis-queue", "--config", &path, "--socket", "/run/r.sock", "list"]);
    let config = load_configuration(&cli).unwrap();
    assert_eq!(resolve_endpoint(&config, None), Endpoint::unix("/run/r.sock"));
}

#[test]
fn test_zero_port_is_rejected() {
    let cli = parse(&["redis-queue", "--port", "0", "list"]);
    assert!(matches!(
        load_configuration(&cli),
        Err(CliError::InvalidArgument { .. })
    ));
}

#[tokio::test]
async fn test_push_pop_commands() {
    let store = MemoryStore::new();
    let mut conn = open(&store).await;

    let pushed = run(
        Commands::Push {
            queue: "jobs".to_string(),
            payload: r#"{"id":1}"#.to_string(),
            json: true,
        },
        &mut conn,
    )
    .await
    .unwrap();
    assert_eq!(pushed, "1\n");

    let popped = run(
        Commands::Pop {
            queue: "jobs".to_string(),
            json: true,
        },
        &mut conn,
    )
    .await
    .unwrap();
    assert_eq!(popped, "{\"id\":1}\n");

    let empty = run(
        Commands::Pop {
            queue: "jobs".to_string(),
            json: true,
        },
        &mut conn,
    )
    .await
    .unwrap();
    assert_eq!(empty, "");
}

#[tokio::test]
async fn test_invalid_json_payload() {
    let store = MemoryStore::new();
    let mut conn = open(&store).await;

    let result = run(
        Commands::Push {
            queue: "jobs".to_string(),
            payload: "{oops".to_string(),
            json: true,
        },
        &mut conn,
    )
    .await;
    assert!(matches!(result, Err(CliError::InvalidArgument { .. })));
}

#[tokio::test]
async fn test_list_elements_delete() {
    let store = MemoryStore::new();
    let mut conn = open(&store).await;
    let jobs = Queue::new("jobs");
    jobs.push(&mut conn, &Value::from("a")).await.unwrap();
    jobs.push(&mut conn, &Value::from("b")).await.unwrap();

    let listed = run(Commands::List, &mut conn).await.unwrap();
    assert_eq!(listed, "queue.jobs\t2\n");

    let elements = run(
        Commands::Elements {
            queue: "jobs".to_string(),
            list: ListArg::Main,
            json: false,
        },
        &mut conn,
    )
    .await
    .unwrap();
    assert_eq!(elements, "b\na\n");

    let deleted = run(
        Commands::Delete {
            names: vec!["jobs".to_string()],
        },
        &mut conn,
    )
    .await
    .unwrap();
    assert_eq!(deleted, "1\n");
    assert!(!store.exists("queue.jobs"));
}

#[tokio::test]
async fn test_restore_command_reports_counts() {
    let store = MemoryStore::new();
    let mut conn = open(&store).await;
    let jobs = Queue::json("jobs");
    jobs.push(&mut conn, &serde_json::json!({"id": 1})).await.unwrap();
    jobs.drain_to_backup(&mut conn).await.unwrap();

    let report = run(
        Commands::Restore {
            queue: "jobs".to_string(),
            json: true,
        },
        &mut conn,
    )
    .await
    .unwrap();

    assert_eq!(report, "requeued 1, dead-lettered 0, discarded 0\n");
    assert_eq!(jobs.len(&mut conn, QueueList::Main).await.unwrap(), 1);
}
