//! Ticket statistics for the admin analytics view.

use brodesk_common::{Category, Priority, Ticket, TicketStatus};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusCount {
    pub status: TicketStatus,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketStats {
    pub total: usize,
    /// One entry per status, in board order, zeros included.
    pub by_status: Vec<StatusCount>,
    /// Mean created-to-resolved time over tickets with `resolved_at`, rounded
    /// to one decimal. Zero when nothing has been resolved.
    pub avg_resolution_hours: f64,
    /// Categories with at least one ticket, in `categories` order.
    pub by_category: Vec<NamedCount>,
    /// Priorities with at least one ticket, lowest first.
    pub by_priority: Vec<NamedCount>,
}

impl TicketStats {
    pub fn compute(tickets: &[Ticket], categories: &[Category]) -> Self {
        let by_status = TicketStatus::ALL
            .into_iter()
            .map(|status| StatusCount {
                status,
                count: tickets.iter().filter(|t| t.status == status).count(),
            })
            .collect();

        let resolution_ms: Vec<i64> = tickets
            .iter()
            .filter_map(|t| t.resolved_at.map(|r| (r - t.created_at).num_milliseconds()))
            .collect();
        let avg_resolution_hours = if resolution_ms.is_empty() {
            0.0
        } else {
            let mean_ms = resolution_ms.iter().sum::<i64>() as f64 / resolution_ms.len() as f64;
            (mean_ms / 3_600_000.0 * 10.0).round() / 10.0
        };

        let by_category = categories
            .iter()
            .map(|c| NamedCount {
                name: c.name.clone(),
                count: tickets.iter().filter(|t| t.category_id == c.id).count(),
            })
            .filter(|c| c.count > 0)
            .collect();

        let by_priority = Priority::ALL
            .into_iter()
            .map(|p| NamedCount {
                name: p.as_str().to_string(),
                count: tickets.iter().filter(|t| t.priority == p).count(),
            })
            .filter(|c| c.count > 0)
            .collect();

        Self {
            total: tickets.len(),
            by_status,
            avg_resolution_hours,
            by_category,
            by_priority,
        }
    }

    pub fn count(&self, status: TicketStatus) -> usize {
        self.by_status
            .iter()
            .find(|s| s.status == status)
            .map_or(0, |s| s.count)
    }
}
