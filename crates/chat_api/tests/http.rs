use chat_api::{ChatApiClient, ChatApiConfig, ChatUpdate, NewChat};
use chat_backend::{ChatId, ChatSource, Message, MessageId, SenderKind};
use serde_json::Value;

fn client() -> ChatApiClient {
    let config = ChatApiConfig::new("https://chat.example.com/app/")
        .with_access_token("user-token")
        .with_store("https://store.example.com", "anon-key");
    ChatApiClient::new(config).expect("client")
}

fn json_body(request: &reqwest::Request) -> Value {
    let bytes = request
        .body()
        .and_then(reqwest::Body::as_bytes)
        .expect("request should carry an in-memory body");
    serde_json::from_slice(bytes).expect("body should be JSON")
}

#[test]
fn http_list_messages_builds_get_under_base_path() {
    let request = client()
        .list_messages_request(ChatId::new(42))
        .expect("build request")
        .build()
        .expect("request");

    assert_eq!(request.method(), "GET");
    assert_eq!(
        request.url().as_str(),
        "https://chat.example.com/app/api/chats/42/messages"
    );
    assert_eq!(
        request.headers()["authorization"].to_str().expect("ascii"),
        "Bearer user-token"
    );
}

#[test]
fn http_send_message_posts_the_row_json() {
    let message = Message::new(
        MessageId::new("local-1"),
        ChatId::new(42),
        SenderKind::User,
        "hello",
    )
    .with_sender("me@example.com");

    let request = client()
        .send_message_request(&message)
        .expect("build request")
        .build()
        .expect("request");

    assert_eq!(request.method(), "POST");
    assert_eq!(
        request.url().as_str(),
        "https://chat.example.com/app/api/chats/42/messages"
    );
    let body = json_body(&request);
    assert_eq!(body["type"], "user");
    assert_eq!(body["chat_id"], 42);
    assert_eq!(body["content"], "hello");
    assert_eq!(body["sender"], "me@example.com");
}

#[test]
fn http_clear_and_abort_target_chat_endpoints() {
    let client = client();

    let clear = client
        .clear_messages_request(ChatId::new(7))
        .expect("build clear")
        .build()
        .expect("clear");
    assert_eq!(clear.method(), "DELETE");
    assert_eq!(
        clear.url().as_str(),
        "https://chat.example.com/app/api/chats/7/messages"
    );

    let abort = client
        .abort_request(ChatId::new(7))
        .expect("build abort")
        .build()
        .expect("abort");
    assert_eq!(abort.method(), "POST");
    assert_eq!(
        abort.url().as_str(),
        "https://chat.example.com/app/api/chats/7/abort"
    );
}

#[test]
fn http_status_read_targets_row_store_single_object() {
    let request = client()
        .status_request(ChatId::new(42))
        .expect("build request")
        .build()
        .expect("request");

    assert_eq!(request.method(), "GET");
    assert_eq!(
        request.url().as_str(),
        "https://store.example.com/rest/v1/chats?select=status&id=eq.42"
    );
    let headers = request.headers();
    assert_eq!(headers["apikey"].to_str().expect("ascii"), "anon-key");
    assert_eq!(
        headers["authorization"].to_str().expect("ascii"),
        "Bearer user-token"
    );
    assert_eq!(
        headers["accept"].to_str().expect("ascii"),
        "application/vnd.pgrst.object+json"
    );
}

#[test]
fn http_status_read_requires_store_url() {
    let client = ChatApiClient::new(ChatApiConfig::new("https://chat.example.com")).expect("client");

    assert!(!client.has_store());
    assert!(matches!(
        client.status_request(ChatId::new(1)),
        Err(chat_api::ChatApiError::MissingStoreUrl)
    ));
}

#[test]
fn http_chat_crud_requests() {
    let client = client();

    let list = client
        .list_chats_request()
        .expect("build list")
        .build()
        .expect("list");
    assert_eq!(list.method(), "GET");
    assert_eq!(list.url().as_str(), "https://chat.example.com/app/api/chats");

    let create = client
        .create_chat_request(&NewChat {
            name: "Chat for Template".to_string(),
            source: ChatSource::Template(5),
        })
        .expect("build create")
        .build()
        .expect("create");
    assert_eq!(create.method(), "POST");
    let body = json_body(&create);
    assert_eq!(body["from_type"], "template");
    assert_eq!(body["from_template"], 5);

    let update = client
        .update_chat_request(
            ChatId::new(9),
            &ChatUpdate {
                name: Some("renamed".to_string()),
                ..ChatUpdate::default()
            },
        )
        .expect("build update")
        .build()
        .expect("update");
    assert_eq!(update.method(), "POST");
    assert_eq!(update.url().as_str(), "https://chat.example.com/app/api/chats/9");

    let delete = client
        .delete_chat_request(ChatId::new(9))
        .expect("build delete")
        .build()
        .expect("delete");
    assert_eq!(delete.method(), "DELETE");
    assert_eq!(delete.url().as_str(), "https://chat.example.com/app/api/chats/9");
}
