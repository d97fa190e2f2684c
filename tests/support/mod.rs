//! In-memory fakes for every seam the bot talks through, so the full
//! conversation flow runs in a test without Postgres, Paynow, or the
//! WhatsApp Cloud API.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use mukoto_server::machine::Bot;
use mukoto_server::models::{Category, Event, NewTicket, Ticket, TicketRecord, TicketType, User};
use mukoto_server::payment::{
    InitiateOutcome, InitiateRequest, PaymentGateway, PaymentStatus, Settlement,
};
use mukoto_server::recovery::RecoveryEngine;
use mukoto_server::repository::{Catalog, TicketStore, UserStore};
use mukoto_server::session::{PaymentMethod, Session, SessionPatch, SessionStore};
use mukoto_server::state::{ChatState, StateStore};
use mukoto_server::ticketing::{Issuer, RenderedTicket, TicketRenderer};
use mukoto_server::utils::error::{BotError, BotResult};
use mukoto_server::whatsapp::{InboundKind, InboundMessage, ListRow, Outbound, SimpleButton};

pub const BUYER: &str = "263771234567";

// ---------------------------------------------------------------- outbound

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(String),
    Buttons { body: String, ids: Vec<String> },
    List { body: String, row_ids: Vec<String> },
    Image { caption: String },
    Document { filename: String },
    Location { name: String },
    UrlButton { url: String },
}

#[derive(Default)]
pub struct RecordingOutbound {
    pub sent: Mutex<Vec<(String, Sent)>>,
}

impl RecordingOutbound {
    pub fn all(&self) -> Vec<(String, Sent)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter_map(|(_, s)| match s {
                Sent::Text(body) => Some(body),
                _ => None,
            })
            .collect()
    }

    fn push(&self, to: &str, sent: Sent) {
        self.sent.lock().unwrap().push((to.to_string(), sent));
    }
}

#[async_trait]
impl Outbound for RecordingOutbound {
    async fn send_text(&self, to: &str, body: &str) -> BotResult<()> {
        self.push(to, Sent::Text(body.to_string()));
        Ok(())
    }

    async fn send_buttons(&self, to: &str, body: &str, buttons: &[SimpleButton]) -> BotResult<()> {
        self.push(
            to,
            Sent::Buttons {
                body: body.to_string(),
                ids: buttons.iter().map(|b| b.id.clone()).collect(),
            },
        );
        Ok(())
    }

    async fn send_list(
        &self,
        to: &str,
        _header: &str,
        body: &str,
        _footer: &str,
        _action_title: &str,
        rows: &[ListRow],
    ) -> BotResult<()> {
        self.push(
            to,
            Sent::List {
                body: body.to_string(),
                row_ids: rows.iter().map(|r| r.id.clone()).collect(),
            },
        );
        Ok(())
    }

    async fn send_image(&self, to: &str, _url: &str, caption: &str) -> BotResult<()> {
        self.push(
            to,
            Sent::Image {
                caption: caption.to_string(),
            },
        );
        Ok(())
    }

    async fn send_document(&self, to: &str, filename: &str, _url: &str) -> BotResult<()> {
        self.push(
            to,
            Sent::Document {
                filename: filename.to_string(),
            },
        );
        Ok(())
    }

    async fn send_location(
        &self,
        to: &str,
        _latitude: f64,
        _longitude: f64,
        name: &str,
        _address: &str,
    ) -> BotResult<()> {
        self.push(
            to,
            Sent::Location {
                name: name.to_string(),
            },
        );
        Ok(())
    }

    async fn send_url_button(
        &self,
        to: &str,
        _header: &str,
        _body: &str,
        _footer: &str,
        _button_text: &str,
        url: &str,
    ) -> BotResult<()> {
        self.push(to, Sent::UrlButton { url: url.to_string() });
        Ok(())
    }
}

/// Rejects the first `failures` sends, then records like
/// [`RecordingOutbound`]. Lets a test knock out a remediation prompt
/// and watch what the bot does next.
pub struct FlakyOutbound {
    failures: AtomicU32,
    pub inner: RecordingOutbound,
}

impl FlakyOutbound {
    pub fn failing_first(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            inner: RecordingOutbound::default(),
        }
    }

    fn gate(&self) -> BotResult<()> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(BotError::external("whatsapp", "message rejected"));
        }
        Ok(())
    }
}

#[async_trait]
impl Outbound for FlakyOutbound {
    async fn send_text(&self, to: &str, body: &str) -> BotResult<()> {
        self.gate()?;
        self.inner.send_text(to, body).await
    }

    async fn send_buttons(&self, to: &str, body: &str, buttons: &[SimpleButton]) -> BotResult<()> {
        self.gate()?;
        self.inner.send_buttons(to, body, buttons).await
    }

    async fn send_list(
        &self,
        to: &str,
        header: &str,
        body: &str,
        footer: &str,
        action_title: &str,
        rows: &[ListRow],
    ) -> BotResult<()> {
        self.gate()?;
        self.inner
            .send_list(to, header, body, footer, action_title, rows)
            .await
    }

    async fn send_image(&self, to: &str, url: &str, caption: &str) -> BotResult<()> {
        self.gate()?;
        self.inner.send_image(to, url, caption).await
    }

    async fn send_document(&self, to: &str, filename: &str, url: &str) -> BotResult<()> {
        self.gate()?;
        self.inner.send_document(to, filename, url).await
    }

    async fn send_location(
        &self,
        to: &str,
        latitude: f64,
        longitude: f64,
        name: &str,
        address: &str,
    ) -> BotResult<()> {
        self.gate()?;
        self.inner
            .send_location(to, latitude, longitude, name, address)
            .await
    }

    async fn send_url_button(
        &self,
        to: &str,
        header: &str,
        body: &str,
        footer: &str,
        button_text: &str,
        url: &str,
    ) -> BotResult<()> {
        self.gate()?;
        self.inner
            .send_url_button(to, header, body, footer, button_text, url)
            .await
    }
}

// ----------------------------------------------------------------- catalog

#[derive(Default)]
pub struct MemCatalog {
    pub events: Vec<Event>,
    pub categories: Vec<Category>,
    pub ticket_types: HashMap<Uuid, Vec<TicketType>>,
    /// When set, every call answers with this error.
    pub outage: Option<String>,
}

#[async_trait]
impl Catalog for MemCatalog {
    async fn search_events(&self, query: &str) -> BotResult<Vec<Event>> {
        if let Some(message) = &self.outage {
            return Err(BotError::external("catalog", message.clone()));
        }
        let needle = query.to_lowercase();
        Ok(self
            .events
            .iter()
            .filter(|e| e.title.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn events_by_category(&self, _category_id: Uuid) -> BotResult<Vec<Event>> {
        if let Some(message) = &self.outage {
            return Err(BotError::external("catalog", message.clone()));
        }
        Ok(self.events.clone())
    }

    async fn categories(&self) -> BotResult<Vec<Category>> {
        if let Some(message) = &self.outage {
            return Err(BotError::external("catalog", message.clone()));
        }
        Ok(self.categories.clone())
    }

    async fn ticket_types(&self, event_id: Uuid) -> BotResult<Vec<TicketType>> {
        if let Some(message) = &self.outage {
            return Err(BotError::external("catalog", message.clone()));
        }
        Ok(self.ticket_types.get(&event_id).cloned().unwrap_or_default())
    }
}

// ------------------------------------------------------------ ticket store

#[derive(Default)]
pub struct MemTicketStore {
    pub capacity: HashMap<Uuid, i64>,
    pub tickets: Mutex<Vec<Ticket>>,
    pub records: Mutex<Vec<(String, TicketRecord)>>,
}

impl MemTicketStore {
    pub fn with_capacity(ticket_type_id: Uuid, capacity: i64) -> Self {
        Self {
            capacity: HashMap::from([(ticket_type_id, capacity)]),
            ..Default::default()
        }
    }

    pub fn preload_ticket(&self, ticket: Ticket) {
        self.tickets.lock().unwrap().push(ticket);
    }

    pub fn preload_record(&self, phone: &str, record: TicketRecord) {
        self.records.lock().unwrap().push((phone.to_string(), record));
    }

    pub fn issued_count(&self) -> usize {
        self.tickets.lock().unwrap().len()
    }
}

#[async_trait]
impl TicketStore for MemTicketStore {
    async fn tickets_by_phone(&self, phone: &str) -> BotResult<Vec<TicketRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == phone)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn find_by_qr(&self, qr_code: &str) -> BotResult<Option<Ticket>> {
        Ok(self
            .tickets
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.qr_code == qr_code && !t.deleted)
            .cloned())
    }

    async fn check_in(&self, qr_code: &str) -> BotResult<()> {
        let mut tickets = self.tickets.lock().unwrap();
        if let Some(ticket) = tickets.iter_mut().find(|t| t.qr_code == qr_code) {
            ticket.checked_in = true;
        }
        Ok(())
    }

    async fn create(&self, new: NewTicket) -> BotResult<Option<Ticket>> {
        let mut tickets = self.tickets.lock().unwrap();
        let taken = tickets
            .iter()
            .filter(|t| t.ticket_type_id == new.ticket_type_id && !t.deleted)
            .count() as i64;
        let capacity = self.capacity.get(&new.ticket_type_id).copied().unwrap_or(0);
        if taken >= capacity {
            return Ok(None);
        }

        let now = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4(),
            event_id: new.event_id,
            ticket_type_id: new.ticket_type_id,
            name_on_ticket: new.name_on_ticket,
            checked_in: false,
            qr_code: Uuid::new_v4().to_string(),
            price_paid: new.price_paid,
            email: new.email,
            phone: new.phone,
            deleted: false,
            payment_status: new.payment_status,
            created_at: now,
            updated_at: now,
        };
        tickets.push(ticket.clone());
        Ok(Some(ticket))
    }

    async fn remaining_capacity(&self, ticket_type_id: Uuid) -> BotResult<i64> {
        let taken = self
            .tickets
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.ticket_type_id == ticket_type_id && !t.deleted)
            .count() as i64;
        Ok(self.capacity.get(&ticket_type_id).copied().unwrap_or(0) - taken)
    }

    async fn recompute_sold_out(&self, _event_id: Uuid) -> BotResult<()> {
        Ok(())
    }
}

// ------------------------------------------------------------------- users

#[derive(Default)]
pub struct MemUsers {
    pub users: Vec<User>,
}

impl MemUsers {
    pub fn approver(phone: &str) -> Self {
        Self {
            users: vec![User {
                id: Uuid::new_v4(),
                organiser_id: Uuid::new_v4(),
                name: Some("Door Staff".into()),
                email: None,
                phone_number: Some(phone.to_string()),
                can_approve_tickets: true,
                deleted: false,
            }],
        }
    }
}

#[async_trait]
impl UserStore for MemUsers {
    async fn by_phone(&self, phone: &str) -> BotResult<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.phone_number.as_deref() == Some(phone) && !u.deleted)
            .cloned())
    }
}

// -------------------------------------------------------- session / state

#[derive(Default)]
pub struct MemSessions {
    pub inner: Mutex<HashMap<String, Session>>,
}

impl MemSessions {
    pub fn snapshot(&self, user_id: &str) -> Session {
        self.inner
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionStore for MemSessions {
    async fn get(&self, user_id: &str) -> BotResult<Session> {
        Ok(self.snapshot(user_id))
    }

    async fn merge(&self, user_id: &str, patch: SessionPatch) -> BotResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.entry(user_id.to_string()).or_default().apply(patch);
        Ok(())
    }

    async fn reset(&self, user_id: &str) -> BotResult<()> {
        self.inner
            .lock()
            .unwrap()
            .insert(user_id.to_string(), Session::default());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemStates {
    pub inner: Mutex<HashMap<String, ChatState>>,
}

impl MemStates {
    pub fn current(&self, user_id: &str) -> ChatState {
        self.inner
            .lock()
            .unwrap()
            .get(user_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn force(&self, user_id: &str, state: ChatState) {
        self.inner.lock().unwrap().insert(user_id.to_string(), state);
    }
}

#[async_trait]
impl StateStore for MemStates {
    async fn get(&self, user_id: &str) -> BotResult<ChatState> {
        Ok(self.current(user_id))
    }

    async fn set(&self, user_id: &str, state: ChatState) -> BotResult<()> {
        self.force(user_id, state);
        Ok(())
    }
}

// ----------------------------------------------------------------- gateway

/// Answers each poll with the next scripted status; once the script
/// runs out it keeps answering `Sent`.
pub struct ScriptedGateway {
    pub statuses: Mutex<VecDeque<PaymentStatus>>,
    pub polls: AtomicU32,
    pub reject_initiate: bool,
}

impl ScriptedGateway {
    pub fn new(statuses: Vec<PaymentStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            polls: AtomicU32::new(0),
            reject_initiate: false,
        }
    }

    pub fn poll_count(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initiate_mobile(
        &self,
        _request: &InitiateRequest,
        _phone: &str,
        method: PaymentMethod,
    ) -> BotResult<InitiateOutcome> {
        if self.reject_initiate {
            return Ok(InitiateOutcome {
                success: false,
                poll_url: None,
                redirect_url: None,
                innbucks: None,
                error: Some("Insufficient balance".into()),
            });
        }
        let innbucks = (method == PaymentMethod::Innbucks).then(|| {
            mukoto_server::payment::InnbucksInfo {
                authorization_code: "123456".into(),
                deep_link_url: "https://innbucks.co.zw/pay/123456".into(),
            }
        });
        Ok(InitiateOutcome {
            success: true,
            poll_url: Some("https://www.paynow.co.zw/poll/abc".into()),
            redirect_url: None,
            innbucks,
            error: None,
        })
    }

    async fn initiate_web(&self, _request: &InitiateRequest) -> BotResult<InitiateOutcome> {
        Ok(InitiateOutcome {
            success: true,
            poll_url: Some("https://www.paynow.co.zw/poll/abc".into()),
            redirect_url: Some("https://www.paynow.co.zw/payment/abc".into()),
            innbucks: None,
            error: None,
        })
    }

    async fn poll(&self, _poll_url: &str) -> BotResult<PaymentStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PaymentStatus::Sent))
    }
}

// ---------------------------------------------------------------- renderer

pub struct StubRenderer;

#[async_trait]
impl TicketRenderer for StubRenderer {
    async fn render(&self, ticket: &TicketRecord) -> BotResult<RenderedTicket> {
        Ok(RenderedTicket {
            name: format!("{}.pdf", ticket.event_title.replace(' ', "_")),
            url: "https://files.mukoto.app/tickets/stub.pdf".into(),
        })
    }
}

/// Renderer whose service is down. Every render attempt errors.
pub struct FailingRenderer;

#[async_trait]
impl TicketRenderer for FailingRenderer {
    async fn render(&self, _ticket: &TicketRecord) -> BotResult<RenderedTicket> {
        Err(BotError::Ticket("renderer responded with status 500".into()))
    }
}

// ---------------------------------------------------------------- fixtures

pub fn sample_event(title: &str) -> Event {
    Event {
        id: Uuid::new_v4(),
        organiser_id: Uuid::new_v4(),
        organiser_name: "Jacaranda Live".into(),
        title: title.to_string(),
        description: Some("An evening of live music".into()),
        start_time: Utc::now() + ChronoDuration::days(7),
        end_time: None,
        latitude: Some("-17.8292".into()),
        longitude: Some("31.0522".into()),
        address: Some("123 Samora Machel Ave".into()),
        location: Some("Harare Gardens".into()),
        image: None,
        is_active: true,
        sold_out: false,
        deleted: false,
        approve_tickets: false,
        ticket_delivery_method: "digital".into(),
    }
}

pub fn paid_type(event_id: Uuid, price: &str) -> TicketType {
    TicketType {
        id: Uuid::new_v4(),
        event_id,
        type_name: "General Admission".into(),
        description: None,
        price: price.parse().unwrap(),
        currency_code: "USD".into(),
        available_quantity: 100,
        deleted: false,
    }
}

pub fn free_type(event_id: Uuid) -> TicketType {
    TicketType {
        id: Uuid::new_v4(),
        event_id,
        type_name: "Free Entry".into(),
        description: None,
        price: Decimal::ZERO,
        currency_code: "USD".into(),
        available_quantity: 100,
        deleted: false,
    }
}

pub fn ticket_record(event: &Event, ticket_type: &TicketType) -> TicketRecord {
    TicketRecord {
        id: Uuid::new_v4(),
        event_id: event.id,
        ticket_type_id: ticket_type.id,
        name_on_ticket: "Rudo".into(),
        checked_in: false,
        qr_code: Uuid::new_v4().to_string(),
        price_paid: ticket_type.price,
        payment_status: "paid".into(),
        event_title: event.title.clone(),
        event_description: event.description.clone(),
        event_start: event.start_time,
        event_end: event.end_time,
        latitude: event.latitude.clone(),
        longitude: event.longitude.clone(),
        address: event.address.clone(),
        location: event.location.clone(),
        ticket_type_name: ticket_type.type_name.clone(),
        organiser_name: event.organiser_name.clone(),
    }
}

pub fn text(body: &str) -> InboundMessage {
    InboundMessage {
        from_phone: BUYER.to_string(),
        from_name: "Rudo".to_string(),
        kind: InboundKind::Text(body.to_string()),
    }
}

pub fn button(id: &str) -> InboundMessage {
    InboundMessage {
        from_phone: BUYER.to_string(),
        from_name: "Rudo".to_string(),
        kind: InboundKind::ButtonReply { id: id.to_string() },
    }
}

pub fn list(id: &str) -> InboundMessage {
    InboundMessage {
        from_phone: BUYER.to_string(),
        from_name: "Rudo".to_string(),
        kind: InboundKind::ListReply { id: id.to_string() },
    }
}

// ----------------------------------------------------------------- harness

pub struct Harness {
    pub bot: Bot,
    pub outbound: Arc<RecordingOutbound>,
    pub sessions: Arc<MemSessions>,
    pub states: Arc<MemStates>,
    pub tickets: Arc<MemTicketStore>,
    pub gateway: Arc<ScriptedGateway>,
}

pub fn harness(
    catalog: MemCatalog,
    tickets: MemTicketStore,
    users: MemUsers,
    gateway: ScriptedGateway,
) -> Harness {
    let outbound = Arc::new(RecordingOutbound::default());
    let sessions = Arc::new(MemSessions::default());
    let states = Arc::new(MemStates::default());
    let tickets = Arc::new(tickets);
    let gateway = Arc::new(gateway);

    let issuer = Arc::new(Issuer::new(
        tickets.clone(),
        Arc::new(users),
        Arc::new(StubRenderer),
        outbound.clone(),
    ));
    let settlement = Arc::new(Settlement::new(
        gateway.clone(),
        outbound.clone(),
        sessions.clone(),
        states.clone(),
        issuer.clone(),
    ));
    let recovery = RecoveryEngine::new(outbound.clone(), sessions.clone(), states.clone());

    let bot = Bot::new(
        outbound.clone(),
        Arc::new(catalog),
        tickets.clone(),
        sessions.clone(),
        states.clone(),
        settlement,
        issuer,
        recovery,
    );

    Harness {
        bot,
        outbound,
        sessions,
        states,
        tickets,
        gateway,
    }
}

/// Like [`harness`] but over an arbitrary channel, for tests that make
/// the channel itself misbehave.
pub fn harness_with_outbound(
    outbound: Arc<dyn Outbound>,
    catalog: MemCatalog,
) -> (Bot, Arc<MemSessions>, Arc<MemStates>) {
    let sessions = Arc::new(MemSessions::default());
    let states = Arc::new(MemStates::default());
    let tickets = Arc::new(MemTicketStore::default());
    let gateway = Arc::new(ScriptedGateway::new(Vec::new()));

    let issuer = Arc::new(Issuer::new(
        tickets.clone(),
        Arc::new(MemUsers::default()),
        Arc::new(StubRenderer),
        outbound.clone(),
    ));
    let settlement = Arc::new(Settlement::new(
        gateway,
        outbound.clone(),
        sessions.clone(),
        states.clone(),
        issuer.clone(),
    ));
    let recovery = RecoveryEngine::new(outbound.clone(), sessions.clone(), states.clone());

    let bot = Bot::new(
        outbound,
        Arc::new(catalog),
        tickets,
        sessions.clone(),
        states.clone(),
        settlement,
        issuer,
        recovery,
    );

    (bot, sessions, states)
}
