//! Minimal runnable demonstration: a single worker thread serving `GET /`
//! with a static body and everything else with `404 Not Found`.
//!
//! Run with `cargo run --example example_server` from the repository root,
//! then `curl http://127.0.0.1:7878/`.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::rc::Rc;
use std::time::Duration;

use halcyon::connection_handler::Handler;
use halcyon::error::NullErrorHandler;
use halcyon::parser::request::Method;
use halcyon::parser::status::Status;
use halcyon::router::HttpRequestRouter;
use halcyon::worker::{Worker, WorkerConfig};

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let addr: SocketAddr = "127.0.0.1:7878".parse().unwrap();
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    tracing::info!(%addr, "listening");

    let mut router: HttpRequestRouter<Handler> = HttpRequestRouter::new();
    let index: Handler = Rc::new(|_req, _body, broker| {
        broker
            .borrow_mut()
            .write_response(Some(b"hello from halcyon\n"), Some("text/plain"), Status::r#Ok, &[]);
    });
    router.add_route(Method::Get, "/", index).unwrap();

    let router = Rc::new(router);
    let error_handler = Rc::new(NullErrorHandler);
    let mut worker = Worker::new(router, error_handler, WorkerConfig::default())?;

    loop {
        match listener.accept() {
            Ok((stream, _peer)) => {
                stream.set_nonblocking(true)?;
                worker.accept(mio::net::TcpStream::from_std(stream))?;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }
        worker.run_once()?;
        std::thread::sleep(Duration::from_millis(1));
    }
}
