use surge_ws::{client, protocol::frame::{codec::CloseCode, CloseFrame}, Message};
use tokio::net::TcpStream;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();
    let tcp = TcpStream::connect("localhost:8080").await.expect("Couldn't connect");
    let (socket, response) = client("ws://localhost:8080/socket", tcp).await.expect("Handshake failed");

    println!("Connected to the server");
    println!("Response HTTP code: {}", response.status());
    println!("Response contains the following headers:");
    for (header, _) in response.headers() {
        println!("* {header}");
    }

    for text in ["Hello!", "How are you?"] {
        socket.send(Message::Text(text.into())).await.unwrap();
        let msg = socket.read_message().await.expect("Error reading message.");
        println!("Received: {msg}");
    }

    socket.close(Some(CloseFrame::new(CloseCode::Normal).with_reason("bye"))).await.unwrap();
}
