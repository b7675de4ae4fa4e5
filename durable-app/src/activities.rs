//! Simulated onboarding activities.
//!
//! Each activity sleeps briefly to stand in for a real external call and
//! returns an identifier minted with `uuid`, so replayed runs visibly
//! reuse the persisted ids instead of minting new ones.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub kind: String,
}

pub async fn create_employee_record(name: &str) -> anyhow::Result<Employee> {
    tokio::time::sleep(Duration::from_millis(200)).await;
    let employee = Employee {
        id: format!("emp_{}", Uuid::new_v4().simple()),
        name: name.to_string(),
    };
    info!(id = %employee.id, name = %employee.name, "created employee record");
    Ok(employee)
}

pub async fn provision_laptop(employee_id: &str) -> anyhow::Result<Ticket> {
    tokio::time::sleep(Duration::from_millis(500)).await;
    let ticket = Ticket {
        id: format!("it_{}", Uuid::new_v4().simple()),
        kind: "laptop".to_string(),
    };
    info!(employee = %employee_id, ticket = %ticket.id, "laptop provisioned");
    Ok(ticket)
}

pub async fn provision_access(employee_id: &str) -> anyhow::Result<Ticket> {
    tokio::time::sleep(Duration::from_millis(300)).await;
    let ticket = Ticket {
        id: format!("iam_{}", Uuid::new_v4().simple()),
        kind: "access".to_string(),
    };
    info!(employee = %employee_id, ticket = %ticket.id, "access provisioned");
    Ok(ticket)
}

pub async fn send_welcome_email(employee: &Employee, tickets: &[Ticket]) -> anyhow::Result<()> {
    tokio::time::sleep(Duration::from_millis(100)).await;
    let ticket_ids: Vec<&str> = tickets.iter().map(|t| t.id.as_str()).collect();
    info!(
        employee = %employee.name,
        tickets = ?ticket_ids,
        "welcome email sent"
    );
    Ok(())
}
