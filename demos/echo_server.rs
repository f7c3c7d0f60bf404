use surge_ws::{
    handshake::server::{ErrorResponse, Request, Response},
    server::accept_header,
    Error,
};
use tokio::{net::TcpListener, task::LocalSet};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();
    let server = TcpListener::bind("0.0.0.0:8080").await.unwrap();

    // connections are !Send, so they run on this thread
    LocalSet::new()
        .run_until(async move {
            loop {
                let (stream, peer) = server.accept().await.expect("accept failed");
                let cb = move |req: &Request, mut res: Response| -> Result<Response, ErrorResponse> {
                    println!("Upgrade from {peer} for {}", req.uri().path());
                    for (header, _) in req.headers() {
                        println!("* {header}");
                    }
                    res.headers_mut().append("Server", "surge-ws echo".parse().unwrap());
                    Ok(res)
                };

                tokio::task::spawn_local(async move {
                    let ws = match accept_header(stream, cb).await {
                        Ok(ws) => ws,
                        Err(e) => return println!("Handshake with {peer} failed: {e}"),
                    };

                    loop {
                        match ws.read_message().await {
                            Ok(msg) if !msg.is_control() => ws.send(msg).await.expect("Failed to echo"),
                            Ok(_) => {}
                            Err(Error::Closed) => break println!("{peer} closed: {:?}", ws.close_reason()),
                            Err(e) => break println!("{peer} failed: {e}"),
                        }
                    }
                });
            }
        })
        .await;
}
