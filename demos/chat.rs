//! Chat client - example of requests and server pushes.
//!
//! This example demonstrates:
//! - Connecting and handshaking with `client.init()`
//! - Typed requests with `request_as`
//! - Handling pushes with `.on_push()` and replying from the handler
//! - Watching the event stream until the session ends
//!
//! # Running
//!
//! Point it at a gateway that serves `connector.entryHandler.enter` and
//! pushes `onChat`:
//!
//! ```text
//! cargo run --example chat -- 127.0.0.1 3010 alice
//! ```

use routewire_client::{Client, ClientEvent, ConnectParams, PushContext};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Serialize)]
struct Enter<'a> {
    username: &'a str,
    rid: &'a str,
}

#[derive(Deserialize, Debug)]
struct EnterReply {
    #[serde(default)]
    users: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct Chat {
    from: String,
    msg: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = args.next().map(|p| p.parse()).transpose()?.unwrap_or(3010);
    let username = args.next().unwrap_or_else(|| "guest".to_string());

    let (client, mut events) = Client::builder()
        .user(json!({ "name": username }))
        .on_push("onChat", |chat: Chat, ctx: PushContext| async move {
            println!("<{}> {}", chat.from, chat.msg);
            // Acknowledge on the same session
            ctx.notify("chat.chatHandler.read", &json!({ "from": chat.from }))
                .await
        })
        .build();

    client.init(ConnectParams::new(host, port)).await?;

    let reply: EnterReply = client
        .request_as(
            "connector.entryHandler.enter",
            &Enter {
                username: &username,
                rid: "lobby",
            },
        )
        .await?;
    println!("Entered lobby with {:?}", reply.users);

    client
        .notify("chat.chatHandler.send", &json!({ "target": "*", "content": "hello" }))
        .await?;

    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Push { route, body } => println!("Unhandled push {route}: {body}"),
            ClientEvent::Kick(reason) => println!("Kicked: {reason}"),
            ClientEvent::Error(e) => eprintln!("Error: {e}"),
            ClientEvent::Disconnect(reason) => {
                println!("Disconnected: {reason:?}");
                break;
            }
            _ => {}
        }
    }

    Ok(())
}
