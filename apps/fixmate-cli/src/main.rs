use anyhow::{anyhow, bail, Context};
use chrono::{Duration as ChronoDuration, Local, Utc};
use clap::Parser;
use fixmate_chat::{
    Attachment, ChatConfig, ChatError, ConversationId, ConversationSummary, DeviceInfo, InboundEvent,
    Message, MessageBody, PricingBreakdown, Role, UserId,
};
use fixmate_client::{
    ChatClient, ClientConfig, ConnectionEvent, Notice, QuotationDecision, QuotationDraft,
    ReconnectPolicy, Session,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST API base URL
    #[arg(long, env = "FIXMATE_API_URL", default_value = "http://localhost:3000/api")]
    api_url: String,

    /// Real-time endpoint
    #[arg(long, env = "FIXMATE_WS_URL", default_value = "ws://localhost:3000/ws")]
    ws_url: String,

    /// Bearer token of the signed-in user
    #[arg(long, env = "FIXMATE_TOKEN", hide_env_values = true)]
    token: String,

    /// Id of the signed-in user
    #[arg(long, env = "FIXMATE_USER_ID")]
    user_id: String,

    /// customer or repairman
    #[arg(long, env = "FIXMATE_ROLE", default_value = "customer")]
    role: Role,

    /// Timeout for JSON requests
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    request_timeout: Duration,

    /// Timeout for attachment uploads
    #[arg(long, default_value = "120s", value_parser = humantime::parse_duration)]
    upload_timeout: Duration,

    /// Reconnect attempts before giving up
    #[arg(long, default_value = "5")]
    reconnect_attempts: u32,

    /// Messages per history page
    #[arg(long, default_value = "30")]
    page_size: usize,
}

impl Args {
    fn config(&self) -> ClientConfig {
        ClientConfig {
            api_url: self.api_url.clone(),
            ws_url: self.ws_url.clone(),
            request_timeout: self.request_timeout,
            upload_timeout: self.upload_timeout,
            reconnect: ReconnectPolicy {
                max_attempts: self.reconnect_attempts,
                ..Default::default()
            },
            chat: ChatConfig {
                page_size: self.page_size,
                ..Default::default()
            },
        }
    }
}

/// What the prompt is pointing at
#[derive(Default)]
struct View {
    inbox: Vec<ConversationSummary>,
    open: Option<ConversationId>,
}

impl View {
    fn resolve(&self, arg: &str) -> anyhow::Result<ConversationId> {
        if let Ok(index) = arg.parse::<usize>() {
            return self
                .inbox
                .get(index.wrapping_sub(1))
                .map(|c| c.id.clone())
                .ok_or_else(|| anyhow!("no conversation #{}", index));
        }
        Ok(ConversationId::from(arg))
    }

    fn open(&self) -> anyhow::Result<ConversationId> {
        self.open
            .clone()
            .ok_or_else(|| anyhow!("no conversation open, use /open <n>"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let args = Args::parse();
    let session = Session {
        user_id: UserId::new(args.user_id.clone()),
        role: args.role,
        token: args.token.clone(),
    };

    let (client, mut events, mut notices) = ChatClient::from_config(&args.config(), session)
        .context("failed to set up chat client")?;
    println!("Signed in as {} ({})", args.user_id, args.role);

    let mut view = View::default();
    match client.start().await {
        Ok(inbox) => {
            view.inbox = inbox;
            print_inbox(&view.inbox);
        }
        Err(e) => eprintln!("Could not load conversations: {}", e),
    }
    print_help();

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut line = String::new();
    prompt();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                show_event(&client, &view, &event);
                client.handle_event(event).await;
            }

            notice = notices.recv() => {
                let Some(notice) = notice else { break };
                show_notice(&notice);
                if notice == Notice::SessionExpired {
                    break;
                }
            }

            read = stdin.read_line(&mut line) => {
                if read? == 0 {
                    break;
                }
                let input = line.trim().to_string();
                line.clear();
                if input.is_empty() {
                    prompt();
                    continue;
                }

                let outcome = match input.strip_prefix('/') {
                    Some(command) => handle_command(&client, &mut view, command).await,
                    None => send_text(&client, &view, &input).await,
                };
                match outcome {
                    Ok(true) => break,
                    Ok(false) => {}
                    // ChatErrors already arrived as notices
                    Err(e) if e.downcast_ref::<ChatError>().is_some() => {
                        debug!("Command failed: {:#}", e)
                    }
                    Err(e) => eprintln!("{:#}", e),
                }
                prompt();
            }
        }
    }

    client.sign_out();
    println!("Bye");
    Ok(())
}

/// Returns `Ok(true)` when the user asked to quit
async fn handle_command(client: &ChatClient, view: &mut View, command: &str) -> anyhow::Result<bool> {
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    match name {
        "quit" | "q" => return Ok(true),
        "help" => print_help(),
        "inbox" => {
            view.inbox = client.open_inbox().await?;
            print_inbox(&view.inbox);
        }
        "open" => {
            let arg = rest.first().ok_or_else(|| anyhow!("usage: /open <n|conversation-id>"))?;
            let id = view.resolve(arg)?;
            client.open_conversation(&id).await?;
            view.open = Some(id.clone());
            print_history(&client.messages(&id));
        }
        "close" => {
            client.close_conversation();
            view.open = None;
        }
        "older" => {
            let id = view.open()?;
            match client.load_older(&id).await? {
                Some(_) => print_history(&client.messages(&id)),
                None => println!("No older messages"),
            }
        }
        "attach" => {
            let id = view.open()?;
            let path = PathBuf::from(rest.first().ok_or_else(|| anyhow!("usage: /attach <file>"))?);
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("cannot read {}", path.display()))?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "attachment".to_string());
            client.stage_attachment(&id, Attachment::new(filename.clone(), data))?;
            println!("Attached {}; type a caption or /send", filename);
        }
        "detach" => client.clear_attachment(&view.open()?),
        "send" => {
            let id = view.open()?;
            client.send(&id).await?;
        }
        "start" => {
            let user = rest.first().ok_or_else(|| anyhow!("usage: /start <user-id>"))?;
            let id = client.start_conversation(&UserId::from(*user)).await?;
            client.open_conversation(&id).await?;
            view.open = Some(id);
        }
        "quote" => {
            let id = view.open()?;
            let draft = parse_quotation(&rest)?;
            client.create_quotation(&id, &draft).await?;
        }
        "accept" | "reject" => {
            let message_id = rest.first().ok_or_else(|| anyhow!("usage: /{} <message-id>", name))?;
            let decision = if name == "accept" {
                QuotationDecision::Accept
            } else {
                QuotationDecision::Reject
            };
            client.respond_quotation(message_id, decision).await?;
        }
        other => bail!("unknown command /{}", other),
    }
    Ok(false)
}

async fn send_text(client: &ChatClient, view: &View, text: &str) -> anyhow::Result<bool> {
    let id = view.open()?;
    client.set_draft_text(&id, text);
    client.send(&id).await?;
    Ok(false)
}

/// `/quote <brand> <model> <parts> <labor> <currency> [days] <issue...>`
fn parse_quotation(args: &[&str]) -> anyhow::Result<QuotationDraft> {
    let [brand, model, parts, labor, currency, days, issue @ ..] = args else {
        bail!("usage: /quote <brand> <model> <parts> <labor> <currency> <valid-days> <issue>");
    };
    let days: i64 = days.parse().context("valid-days must be a number")?;
    Ok(QuotationDraft {
        device: DeviceInfo {
            brand: brand.to_string(),
            model: model.to_string(),
            issue: issue.join(" "),
        },
        pricing: PricingBreakdown {
            parts: parts.parse().context("parts must be a whole amount")?,
            labor: labor.parse().context("labor must be a whole amount")?,
            other: 0,
            currency: currency.to_string(),
        },
        valid_until: Utc::now() + ChronoDuration::days(days),
    })
}

fn show_event(client: &ChatClient, view: &View, event: &ConnectionEvent) {
    match event {
        ConnectionEvent::Connected => println!("\n✓ Connected"),
        ConnectionEvent::Inbound(InboundEvent::NewMessage { message })
            if view.open.as_ref() == Some(&message.conversation_id)
                && message.sender_role != client.session().role =>
        {
            println!();
            print_message(message);
        }
        ConnectionEvent::Inbound(InboundEvent::NewMessage { message })
            if message.sender_role != client.session().role =>
        {
            println!("\n• New message in {}", message.conversation_id);
        }
        _ => return,
    }
    prompt();
}

fn show_notice(notice: &Notice) {
    match notice {
        Notice::Info(text) => println!("\n{}", text),
        Notice::Warning(text) => println!("\n! {}", text),
        Notice::Error(e) => eprintln!("\n✗ {}", e),
        Notice::SessionExpired => eprintln!("\n✗ Session expired, please sign in again"),
    }
    prompt();
}

fn print_inbox(inbox: &[ConversationSummary]) {
    if inbox.is_empty() {
        println!("No conversations yet");
        return;
    }
    for (i, c) in inbox.iter().enumerate() {
        let presence = if c.online { "●" } else { "○" };
        let unread = if c.unread_count > 0 {
            format!(" ({} unread)", c.unread_count)
        } else {
            String::new()
        };
        let last = c
            .last_message
            .as_ref()
            .map(|m| m.preview.as_str())
            .unwrap_or("");
        println!("{:>3}. {} {}{}  {}", i + 1, presence, c.counterpart.name, unread, last);
    }
}

fn print_history(messages: &[Message]) {
    for message in messages {
        print_message(message);
    }
}

fn print_message(message: &Message) {
    let time = message.timestamp.with_timezone(&Local).format("%H:%M");
    let marker = if message.is_pending() { " …" } else { "" };
    let text = match &message.body {
        MessageBody::Quotation(q) => format!(
            "Quotation for {} {}: {} {} ({:?}) [{}]",
            q.device.brand,
            q.device.model,
            q.pricing.total(),
            q.pricing.currency,
            q.effective_status(Utc::now()),
            message.id
        ),
        body => body.preview(),
    };
    println!("[{}] {}: {}{}", time, message.sender_role, text, marker);
}

fn print_help() {
    println!("Commands:");
    println!("  /inbox                 list conversations");
    println!("  /open <n|id>           open a conversation");
    println!("  /older                 load older messages");
    println!("  /attach <file>         stage an attachment, /detach to drop it");
    println!("  /send                  send the staged attachment");
    println!("  /start <user-id>       start a conversation");
    println!("  /quote <brand> <model> <parts> <labor> <currency> <days> <issue>");
    println!("  /accept <id>, /reject <id>   answer a quotation");
    println!("  /close, /quit");
    println!("Anything else is sent as a message to the open conversation.");
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}
