use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use super::models::Farmer;

pub const OTP_DIGITS: usize = 6;
pub const OTP_TTL_MINUTES: i64 = 10;

pub fn generate_otp() -> String {
    let code: u32 = rand::rng().random_range(0..1_000_000);
    format!("{:0width$}", code, width = OTP_DIGITS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpRejection {
    NoneIssued,
    Expired,
    Mismatch,
}

impl OtpRejection {
    pub fn message(self) -> &'static str {
        match self {
            OtpRejection::NoneIssued => "No OTP found",
            OtpRejection::Expired => "OTP expired",
            OtpRejection::Mismatch => "Invalid OTP",
        }
    }
}

pub fn issue(farmer: &mut Farmer, now: DateTime<Utc>) -> String {
    let otp = generate_otp();
    farmer.otp = Some(otp.clone());
    farmer.otp_created_at = Some(now);
    farmer.updated_at = now;
    otp
}

/// Checks `submitted` against the pending code and updates `farmer`: an
/// expired code is cleared, a matching one is consumed and marks the farmer
/// verified and active. A mismatch leaves the pending code in place.
pub fn verify(farmer: &mut Farmer, submitted: &str, now: DateTime<Utc>) -> Result<(), OtpRejection> {
    let (Some(otp), Some(issued_at)) = (farmer.otp.as_deref(), farmer.otp_created_at) else {
        return Err(OtpRejection::NoneIssued);
    };
    if otp.is_empty() {
        return Err(OtpRejection::NoneIssued);
    }

    if now > issued_at + Duration::minutes(OTP_TTL_MINUTES) {
        farmer.otp = None;
        farmer.otp_created_at = None;
        farmer.updated_at = now;
        return Err(OtpRejection::Expired);
    }
    if otp != submitted.trim() {
        return Err(OtpRejection::Mismatch);
    }

    farmer.is_verified = true;
    farmer.is_active = true;
    farmer.otp = None;
    farmer.otp_created_at = None;
    farmer.updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::farmers::models::PreferredLanguage;
    use uuid::Uuid;

    fn farmer() -> Farmer {
        let now = Utc::now();
        Farmer {
            id: Uuid::new_v4(),
            phone: "+919812345678".into(),
            email: "a@example.com".into(),
            first_name: "Asha".into(),
            last_name: String::new(),
            district: "Hassan".into(),
            taluk: "Belur".into(),
            village: "Halebidu".into(),
            land_size: None,
            crops_grown: Vec::new(),
            preferred_language: PreferredLanguage::Kn,
            is_verified: false,
            is_active: false,
            password_hash: String::new(),
            otp: None,
            otp_created_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..50 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn no_pending_code() {
        let mut f = farmer();
        assert_eq!(verify(&mut f, "123456", Utc::now()), Err(OtpRejection::NoneIssued));
    }

    #[test]
    fn expired_code_is_cleared() {
        let mut f = farmer();
        let issued = Utc::now() - Duration::minutes(11);
        let otp = issue(&mut f, issued);

        assert_eq!(verify(&mut f, &otp, Utc::now()), Err(OtpRejection::Expired));
        assert!(f.otp.is_none());
        assert_eq!(verify(&mut f, &otp, Utc::now()), Err(OtpRejection::NoneIssued));
    }

    #[test]
    fn mismatch_keeps_code_pending() {
        let mut f = farmer();
        let now = Utc::now();
        let otp = issue(&mut f, now);
        let wrong = if otp == "000000" { "111111" } else { "000000" };

        assert_eq!(verify(&mut f, wrong, now), Err(OtpRejection::Mismatch));
        assert_eq!(f.otp.as_deref(), Some(otp.as_str()));
        assert!(!f.is_verified);
    }

    #[test]
    fn match_verifies_and_is_single_use() {
        let mut f = farmer();
        let now = Utc::now();
        let otp = issue(&mut f, now);

        assert_eq!(verify(&mut f, &otp, now + Duration::minutes(9)), Ok(()));
        assert!(f.is_verified && f.is_active);
        assert_eq!(verify(&mut f, &otp, now), Err(OtpRejection::NoneIssued));
    }
}
