const MAX_NAME_LEN: usize = 200;
const MAX_EMAIL_LEN: usize = 254;
pub const MIN_PASSWORD_LEN: usize = 8;

pub fn validate_row_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Name is required.".into());
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(format!("Name cannot exceed {MAX_NAME_LEN} characters."));
    }
    Ok(())
}

/// Shape check only: one `@`, a non-empty local part and a dotted domain.
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required.".into());
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(format!("Email cannot exceed {MAX_EMAIL_LEN} characters."));
    }

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err("Enter a valid email address.".into())
    }
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters."
        ));
    }
    Ok(())
}

pub fn validate_row_id(id: Option<&str>) -> Result<&str, String> {
    match id.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err("Missing row id.".into()),
    }
}
