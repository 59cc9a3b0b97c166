use super::types::{AuditLogEntry, ExportFormat};
use super::AuditError;

const CSV_HEADER: [&str; 14] = [
    "id",
    "created_at",
    "tenant_id",
    "actor_id",
    "actor_type",
    "action",
    "entity_type",
    "entity_id",
    "description",
    "outcome",
    "error_message",
    "ip_address",
    "user_agent",
    "metadata",
];

pub fn render(entries: &[AuditLogEntry], format: ExportFormat) -> Result<Vec<u8>, AuditError> {
    match format {
        ExportFormat::Csv => to_csv(entries),
        ExportFormat::Jsonl => to_jsonl(entries),
    }
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

fn to_csv(entries: &[AuditLogEntry]) -> Result<Vec<u8>, AuditError> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer
        .write_record(CSV_HEADER)
        .map_err(|e| AuditError::Internal(e.to_string()))?;

    for entry in entries {
        writer
            .write_record([
                entry.id.to_string(),
                entry.created_at.to_rfc3339(),
                entry.tenant_id.to_string(),
                opt(&entry.actor_id),
                entry.actor_type.to_string(),
                entry.action.to_string(),
                entry.entity_type.to_string(),
                opt(&entry.entity_id),
                entry.description.clone(),
                entry.outcome.to_string(),
                opt(&entry.error_message),
                opt(&entry.ip_address),
                opt(&entry.user_agent),
                entry.metadata.to_string(),
            ])
            .map_err(|e| AuditError::Internal(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| AuditError::Internal(e.to_string()))
}

fn to_jsonl(entries: &[AuditLogEntry]) -> Result<Vec<u8>, AuditError> {
    let mut out = Vec::new();
    for entry in entries {
        serde_json::to_writer(&mut out, entry).map_err(|e| AuditError::Internal(e.to_string()))?;
        out.push(b'\n');
    }
    Ok(out)
}
