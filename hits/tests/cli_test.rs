use {
    std::process::{Command, Output},
    hits::config::{ENV_DATABASE_URL, ENV_DRIVER_NAME, ENV_PASSWORD, ENV_USERNAME},
    crate::drivers::TestDatabase,
};


fn hits_command(database: &TestDatabase, args: &[&str]) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_hits"));
    command
        .args(args)
        .env(ENV_DATABASE_URL, database.url())
        .env_remove(ENV_DRIVER_NAME)
        .env_remove(ENV_USERNAME)
        .env_remove(ENV_PASSWORD);
    command
}

/// The response body is the last line, logs go before it.
fn response_body(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .last()
        .unwrap_or_default()
        .to_owned()
}

#[test]
fn increment_command() {
    let database = TestDatabase::new().with_sequence(3, "homepage", 41);

    let output = hits_command(&database, &["increment", "homepage"]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(r#"{"visit_count":"42"}"#, response_body(&output));

    let output = hits_command(&database, &["--increment-mode", "transactional", "increment", "homepage"]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(r#"{"visit_count":"43"}"#, response_body(&output));

    assert_eq!(Some(43), database.sequence_count("homepage"));
}

#[test]
fn increment_command_blank_sequence() {
    let database = TestDatabase::new().with_sequence(3, "homepage", 41);

    let output = hits_command(&database, &["increment", " "]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(r#"{"visit_count":"-1","error":"missing query param 'sequence'"}"#, response_body(&output));
    assert_eq!(Some(41), database.sequence_count("homepage"));
}

#[test]
fn increment_command_fails_for_unknown_driver() {
    let database = TestDatabase::new().with_sequence(3, "homepage", 41);

    let output = hits_command(&database, &["increment", "homepage"])
        .env(ENV_DRIVER_NAME, "com.mysql.cj.jdbc.Driver")
        .output()
        .unwrap();
    assert_eq!(Some(1), output.status.code());
    assert_eq!(r#"{"visit_count":"-1","error":"Something went wrong!"}"#, response_body(&output));
    assert_eq!(Some(41), database.sequence_count("homepage"));
}
