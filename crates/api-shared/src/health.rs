use crate::wire::HealthRes;

/// Health service shared by the REST server and the combined binary.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Health of the process itself. The node is not contacted.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "EHR is alive".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_health_reports_ok() {
        let res = HealthService::check_health();
        assert!(res.ok);
        assert_eq!(res.message, "EHR is alive");
    }
}
