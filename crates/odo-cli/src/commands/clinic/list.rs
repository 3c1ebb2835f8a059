use odo_auth::ControllerState;
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::{Tabular, output};

#[derive(Debug, Serialize)]
struct ClinicRow {
    clinic_id: String,
    clinic_name: String,
    role: String,
    provider_id: Option<String>,
    active: bool,
}

#[derive(Debug, Serialize)]
struct ClinicListResponse {
    clinics: Vec<ClinicRow>,
    count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

impl Tabular for ClinicListResponse {
    fn headers(&self) -> Vec<&'static str> {
        vec!["clinic_id", "clinic_name", "role", "provider_id", "active"]
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.clinics
            .iter()
            .map(|row| {
                vec![
                    row.clinic_id.clone(),
                    row.clinic_name.clone(),
                    row.role.clone(),
                    row.provider_id.clone().unwrap_or_else(|| "-".into()),
                    if row.active { "active".into() } else { String::new() },
                ]
            })
            .collect()
    }

    fn footer(&self) -> Option<String> {
        self.note.clone()
    }
}

pub fn handle(ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let response = build_response(&ctx.controller.snapshot())?;
    output(&response, flags.format)
}

fn build_response(state: &ControllerState) -> anyhow::Result<ClinicListResponse> {
    if !state.is_authenticated() {
        anyhow::bail!("clinic list: not signed in (run `odo auth login`)");
    }
    let memberships = state.memberships.as_ref().ok_or_else(|| {
        anyhow::anyhow!("clinic list: memberships could not be loaded, try again later")
    })?;

    let active_id = state.active.as_ref().map(|a| a.clinic_id.as_str());
    let clinics = memberships
        .iter()
        .map(|m| ClinicRow {
            clinic_id: m.clinic_id.clone(),
            clinic_name: m.clinic_name.clone(),
            role: m.role.to_string(),
            provider_id: m.provider_id.clone(),
            active: Some(m.clinic_id.as_str()) == active_id,
        })
        .collect::<Vec<_>>();

    let note = clinics
        .is_empty()
        .then(|| "no clinic memberships; ask a clinic administrator for access".to_string());

    Ok(ClinicListResponse {
        count: clinics.len(),
        clinics,
        note,
    })
}
