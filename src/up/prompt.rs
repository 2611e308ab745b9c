pub struct UpPrompt {
    pub title: String,
    pub description: String,
}

pub(crate) fn make_credential_prompt(rp_id: &str, rp_name: Option<&str>, user_display: Option<&str>) -> UpPrompt {
    let site = match rp_name {
        Some(name) => format!("{name} ({rp_id})"),
        None => rp_id.to_string(),
    };
    let account = user_display.unwrap_or("(unknown)");
    UpPrompt {
        title: "fidelium".to_string(),
        description: format!("Register new passkey\n\nSite: {site}\nAccount: {account}\n\nConfirm to create, or deny."),
    }
}

pub(crate) fn get_assertion_prompt(rp_id: &str) -> UpPrompt {
    UpPrompt {
        title: "fidelium".to_string(),
        description: format!("Sign in with passkey\n\nSite: {rp_id}\n\nConfirm to sign in, or deny."),
    }
}

pub(crate) fn reset_prompt() -> UpPrompt {
    UpPrompt {
        title: "fidelium".to_string(),
        description: "Factory reset\n\nAll credentials and the PIN will be erased.\n\nConfirm to reset, or deny."
            .to_string(),
    }
}

pub(crate) fn selection_prompt() -> UpPrompt {
    UpPrompt {
        title: "fidelium".to_string(),
        description: "Select this authenticator\n\nConfirm to select, or deny.".to_string(),
    }
}
