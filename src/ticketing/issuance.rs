//! Ticket issuance: capacity-gated creation, PDF delivery, free
//! registration and QR check-in.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::models::{Event, NewTicket, Ticket, TicketRecord, TicketType};
use crate::repository::{TicketStore, UserStore};
use crate::session::Session;
use crate::ticketing::renderer::TicketRenderer;
use crate::utils::error::{BotError, BotResult};
use crate::utils::validation::normalize_phone;
use crate::whatsapp::Outbound;

const PURCHASE_EMAIL: &str = "purchases@mukoto.app";
const FREE_REGISTRATION_EMAIL: &str = "free-registration@mukoto.app";

/// How many units of a multi-ticket purchase actually made it out the
/// door. Partial success is reported, not rolled back: tickets already
/// issued stay issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssueSummary {
    pub issued: u32,
    pub requested: u32,
}

impl IssueSummary {
    pub fn complete(&self) -> bool {
        self.issued == self.requested
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInOutcome {
    /// Scanner has no approver rights. Deliberately silent: we do not
    /// reveal which numbers can approve tickets.
    Unauthorized,
    InvalidCode,
    Success,
    AlreadyCheckedIn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    SoldOut,
    Registered { delivered: bool },
}

pub struct Issuer {
    tickets: Arc<dyn TicketStore>,
    users: Arc<dyn UserStore>,
    renderer: Arc<dyn TicketRenderer>,
    outbound: Arc<dyn Outbound>,
}

impl Issuer {
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        users: Arc<dyn UserStore>,
        renderer: Arc<dyn TicketRenderer>,
        outbound: Arc<dyn Outbound>,
    ) -> Self {
        Self {
            tickets,
            users,
            renderer,
            outbound,
        }
    }

    /// Issue one ticket per purchased unit after a confirmed payment.
    /// Stops early when capacity runs out or rendering/delivery fails;
    /// the summary tells the caller how far it got.
    pub async fn issue_paid(&self, user_id: &str, session: &Session) -> BotResult<IssueSummary> {
        let event = session
            .event
            .as_ref()
            .ok_or_else(|| BotError::Ticket("no event selected".into()))?;
        let ticket_type = session
            .ticket_type
            .as_ref()
            .ok_or_else(|| BotError::Ticket("no ticket type selected".into()))?;
        let phone = session
            .phone_number
            .as_deref()
            .ok_or_else(|| BotError::Ticket("no payment phone on session".into()))?;
        let requested = session
            .quantity
            .ok_or_else(|| BotError::Ticket("no quantity on session".into()))?;

        let name = session.user_name.clone().unwrap_or_else(|| "Guest".into());
        // Stored in international form regardless of how it was entered.
        let intl_phone = match phone.strip_prefix('0') {
            Some(rest) => format!("263{rest}"),
            None => phone.to_string(),
        };

        let mut issued = 0;
        for _ in 0..requested {
            let new_ticket = NewTicket {
                event_id: event.id,
                ticket_type_id: ticket_type.id,
                name_on_ticket: name.clone(),
                price_paid: ticket_type.price,
                email: PURCHASE_EMAIL.into(),
                phone: intl_phone.clone(),
                payment_status: "paid".into(),
            };

            let Some(ticket) = self.tickets.create(new_ticket).await? else {
                tracing::warn!(user = %user_id, event = %event.id, "capacity exhausted mid-purchase");
                break;
            };

            // A render/delivery failure stops the run with a partial
            // count, like the capacity branch; the summary tells the
            // caller how many tickets actually reached the user.
            if let Err(error) = self.deliver(user_id, &ticket, event, ticket_type).await {
                tracing::error!(user = %user_id, ticket = %ticket.id, %error, "ticket delivery failed mid-issuance");
                break;
            }
            issued += 1;
        }

        if issued > 0 {
            self.tickets.recompute_sold_out(event.id).await?;
            if event.requires_collection() {
                self.outbound
                    .send_text(
                        user_id,
                        &crate::machine::prompts::collection_reminder(&event.title),
                    )
                    .await?;
            }
        }

        Ok(IssueSummary { issued, requested })
    }

    /// Zero-price registration: no payment protocol, same capacity
    /// gate and delivery pipeline.
    pub async fn register_free(
        &self,
        user_id: &str,
        session: &Session,
    ) -> BotResult<RegistrationOutcome> {
        let event = session
            .event
            .as_ref()
            .ok_or_else(|| BotError::Ticket("no event selected".into()))?;
        let ticket_type = session
            .ticket_type
            .as_ref()
            .ok_or_else(|| BotError::Ticket("no ticket type selected".into()))?;
        let name = session.user_name.clone().unwrap_or_else(|| "Guest".into());

        let new_ticket = NewTicket {
            event_id: event.id,
            ticket_type_id: ticket_type.id,
            name_on_ticket: name,
            price_paid: Decimal::ZERO,
            email: FREE_REGISTRATION_EMAIL.into(),
            phone: user_id.to_string(),
            payment_status: "free_registration".into(),
        };

        let Some(ticket) = self.tickets.create(new_ticket).await? else {
            return Ok(RegistrationOutcome::SoldOut);
        };

        self.tickets.recompute_sold_out(event.id).await?;

        let delivered = match self.deliver(user_id, &ticket, event, ticket_type).await {
            Ok(()) => true,
            Err(error) => {
                // The registration stands even when the document could
                // not be produced; the user is told to contact support.
                tracing::error!(user = %user_id, %error, "ticket delivery failed after registration");
                false
            }
        };

        if delivered && event.requires_collection() {
            self.outbound
                .send_text(
                    user_id,
                    &crate::machine::prompts::collection_reminder(&event.title),
                )
                .await?;
        }

        Ok(RegistrationOutcome::Registered { delivered })
    }

    async fn deliver(
        &self,
        user_id: &str,
        ticket: &Ticket,
        event: &Event,
        ticket_type: &TicketType,
    ) -> BotResult<()> {
        let record = denormalize(ticket, event, ticket_type);
        let rendered = self.renderer.render(&record).await?;
        self.outbound
            .send_document(user_id, &rendered.name.to_lowercase(), &rendered.url)
            .await
    }

    /// Re-render and send an existing ticket record (resend-ticket flow).
    pub async fn resend(&self, user_id: &str, record: &TicketRecord) -> BotResult<()> {
        let rendered = self.renderer.render(record).await?;
        self.outbound
            .send_document(user_id, &rendered.name.to_lowercase(), &rendered.url)
            .await
    }

    /// QR check-in, gated on the scanner's approver flag. A ticket goes
    /// `checked_in: false -> true` exactly once; re-scans are reported,
    /// never re-applied.
    pub async fn check_in(&self, scanner_phone: &str, qr_code: &str) -> BotResult<CheckInOutcome> {
        let local = normalize_phone(scanner_phone);
        let scanner = self.users.by_phone(&local).await?;
        let authorized = scanner.map(|u| u.can_approve_tickets).unwrap_or(false);
        if !authorized {
            tracing::warn!(scanner = %local, "check-in attempt without approver rights");
            return Ok(CheckInOutcome::Unauthorized);
        }

        match self.tickets.find_by_qr(qr_code).await? {
            None => Ok(CheckInOutcome::InvalidCode),
            Some(ticket) if ticket.checked_in => Ok(CheckInOutcome::AlreadyCheckedIn),
            Some(_) => {
                self.tickets.check_in(qr_code).await?;
                Ok(CheckInOutcome::Success)
            }
        }
    }
}

fn denormalize(ticket: &Ticket, event: &Event, ticket_type: &TicketType) -> TicketRecord {
    TicketRecord {
        id: ticket.id,
        event_id: event.id,
        ticket_type_id: ticket_type.id,
        name_on_ticket: ticket.name_on_ticket.clone(),
        checked_in: ticket.checked_in,
        qr_code: ticket.qr_code.clone(),
        price_paid: ticket.price_paid,
        payment_status: ticket.payment_status.clone(),
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
