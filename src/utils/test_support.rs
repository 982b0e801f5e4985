use std::io::ErrorKind;
use std::net::TcpListener;

/// Mock-server tests bind an ephemeral localhost port; some sandboxes refuse.
pub fn should_skip_httpmock() -> bool {
    match TcpListener::bind(("127.0.0.1", 0)) {
        Ok(_) => false,
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            eprintln!("skipping httpmock test: sandbox forbids binding to localhost");
            true
        }
        Err(err) => panic!("failed to bind localhost for httpmock tests: {err}"),
    }
}
