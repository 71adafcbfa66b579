//! Created-by / modified-by stamping

use bson::{Bson, DateTime};
use griddle_common::{GriddleError, Result};

use crate::request::{Caller, CrudRequest};
use crate::resource::{ResourceDescriptor, CREATE_DATE_FIELD, MODIFY_DATE_FIELD, STATUS_FIELD};

pub const CREATE_USER_ID_FIELD: &str = "createUserId";
pub const CREATE_USERNAME_FIELD: &str = "createUsername";
pub const CREATE_USER_COMPANY_ID_FIELD: &str = "createUserCompanyId";
pub const MODIFY_USER_ID_FIELD: &str = "modifyUserId";
pub const MODIFY_USERNAME_FIELD: &str = "modifyUsername";
pub const SYSADMIN_DATE_FIELD: &str = "sysadminDate";

/// Status given to new documents that do not carry one
pub const CREATED_STATUS: &str = "created";

fn now() -> Bson {
    Bson::DateTime(DateTime::from_chrono(chrono::Utc::now()))
}

/// The identity audit fields are attributed to
fn acting(caller: &Caller) -> &Caller {
    caller.on_behalf_of.as_deref().unwrap_or(caller)
}

fn caller_name(caller: &Caller) -> Bson {
    Bson::String(caller.name.clone().unwrap_or_default())
}

fn caller_id(caller: &Caller) -> Bson {
    caller.id.clone().unwrap_or(Bson::Null)
}

/// Stamp creation audit fields onto `req.data`.
///
/// # Errors
/// `Audit` when there is no caller, or when `noaudit` is set and the data
/// lacks `createUserId` / `createUsername`.
pub fn set_created_by(resource: &ResourceDescriptor, req: &mut CrudRequest) -> Result<()> {
    if !resource.audits_create() {
        return Ok(());
    }

    let caller = req
        .caller
        .as_ref()
        .ok_or_else(|| GriddleError::Audit("No caller found for setCreatedBy".to_string()))?;
    let data = req.data.get_or_insert_with(Default::default);

    if !data.contains_key(STATUS_FIELD) {
        data.insert(STATUS_FIELD, CREATED_STATUS);
    }
    if !data.contains_key(CREATE_DATE_FIELD) {
        data.insert(CREATE_DATE_FIELD, now());
    }

    if req.noaudit {
        if !data.contains_key(CREATE_USER_ID_FIELD) || !data.contains_key(CREATE_USERNAME_FIELD) {
            return Err(GriddleError::Audit(
                "noaudit on create requires createUserId and createUsername".to_string(),
            ));
        }
    } else if let Some(other) = caller.on_behalf_of.as_deref() {
        data.insert(CREATE_USER_ID_FIELD, caller_id(other));
        data.insert(CREATE_USERNAME_FIELD, caller_name(other));
    } else {
        data.insert(CREATE_USER_ID_FIELD, caller_id(caller));
        data.insert(CREATE_USERNAME_FIELD, caller_name(caller));
        if let Some(company_id) = &caller.company_id {
            data.insert(CREATE_USER_COMPANY_ID_FIELD, company_id.clone());
        }
    }

    Ok(())
}

/// Stamp modification audit fields onto `req.data`, keeping any already set.
///
/// # Errors
/// `Audit` when there is no caller.
pub fn set_modified_by(resource: &ResourceDescriptor, req: &mut CrudRequest) -> Result<()> {
    if !resource.audits_modify() {
        return Ok(());
    }

    let caller = req
        .caller
        .as_ref()
        .ok_or_else(|| GriddleError::Audit("No caller found for setModifiedBy".to_string()))?;
    let data = req.data.get_or_insert_with(Default::default);

    if caller.is_system_admin() {
        data.insert(SYSADMIN_DATE_FIELD, now());
        return Ok(());
    }

    let who = acting(caller);
    if !data.contains_key(MODIFY_DATE_FIELD) {
        data.insert(MODIFY_DATE_FIELD, now());
    }
    if !data.contains_key(MODIFY_USER_ID_FIELD) {
        data.insert(MODIFY_USER_ID_FIELD, caller_id(who));
    }
    if !data.contains_key(MODIFY_USERNAME_FIELD) {
        data.insert(MODIFY_USERNAME_FIELD, caller_name(who));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::FieldType;
    use bson::doc;

    fn audited() -> ResourceDescriptor {
        ResourceDescriptor::new(
            "posts",
            vec![
                ("status".to_string(), FieldType::String),
                ("createDate".to_string(), FieldType::Date),
                ("modifyDate".to_string(), FieldType::Date),
            ],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_created_by_requires_caller() {
        let mut req = CrudRequest::new().with_data(doc! { "title": "x" });
        let err = set_created_by(&audited(), &mut req).unwrap_err();
        assert!(matches!(err, GriddleError::Audit(ref m) if m == "No caller found for setCreatedBy"));
    }

    #[test]
    fn test_created_by_stamps_caller() {
        let mut req = CrudRequest::new()
            .with_caller(Caller::new("u1", "jeff").with_company("c9"))
            .with_data(doc! { "title": "x" });
        set_created_by(&audited(), &mut req).unwrap();

        let data = req.data.unwrap();
        assert_eq!(data.get_str("status").unwrap(), "created");
        assert_eq!(data.get_str("createUserId").unwrap(), "u1");
        assert_eq!(data.get_str("createUsername").unwrap(), "jeff");
        assert_eq!(data.get_str("createUserCompanyId").unwrap(), "c9");
        assert!(data.get_datetime("createDate").is_ok());
    }

    #[test]
    fn test_created_by_keeps_status() {
        let mut req = CrudRequest::new()
            .with_caller(Caller::new("u1", "jeff"))
            .with_data(doc! { "status": "approved" });
        set_created_by(&audited(), &mut req).unwrap();
        assert_eq!(req.data.unwrap().get_str("status").unwrap(), "approved");
    }

    #[test]
    fn test_created_by_on_behalf_of() {
        let caller = Caller::new("u1", "jeff")
            .with_company("c9")
            .on_behalf_of(Caller::new("u2", "anna"));
        let mut req = CrudRequest::new().with_caller(caller);
        set_created_by(&audited(), &mut req).unwrap();

        let data = req.data.unwrap();
        assert_eq!(data.get_str("createUserId").unwrap(), "u2");
        assert_eq!(data.get_str("createUsername").unwrap(), "anna");
        assert!(!data.contains_key("createUserCompanyId"));
    }

    #[test]
    fn test_created_by_noaudit() {
        let mut missing = CrudRequest::new()
            .with_caller(Caller::new("u1", "jeff"))
            .with_data(doc! { "createUserId": "u7" })
            .noaudit();
        assert!(matches!(
            set_created_by(&audited(), &mut missing),
            Err(GriddleError::Audit(_))
        ));

        let mut supplied = CrudRequest::new()
            .with_caller(Caller::new("u1", "jeff"))
            .with_data(doc! { "createUserId": "u7", "createUsername": "imported" })
            .noaudit();
        set_created_by(&audited(), &mut supplied).unwrap();
        let data = supplied.data.unwrap();
        assert_eq!(data.get_str("createUserId").unwrap(), "u7");
        assert_eq!(data.get_str("createUsername").unwrap(), "imported");
    }

    #[test]
    fn test_unaudited_resource_untouched() {
        let plain = ResourceDescriptor::new(
            "logs",
            vec![("createDate".to_string(), FieldType::Date)],
            vec![],
        )
        .unwrap();
        let mut req = CrudRequest::new().with_data(doc! { "a": 1 });

        set_created_by(&plain, &mut req).unwrap();
        set_modified_by(&plain, &mut req).unwrap();
        assert_eq!(req.data.unwrap(), doc! { "a": 1 });
    }

    #[test]
    fn test_modified_by_requires_caller() {
        let mut req = CrudRequest::new();
        let err = set_modified_by(&audited(), &mut req).unwrap_err();
        assert!(matches!(err, GriddleError::Audit(ref m) if m == "No caller found for setModifiedBy"));
    }

    #[test]
    fn test_modified_by_system_admin() {
        let mut req = CrudRequest::new().with_caller(Caller::system_admin());
        set_modified_by(&audited(), &mut req).unwrap();

        let data = req.data.unwrap();
        assert!(data.get_datetime("sysadminDate").is_ok());
        assert!(!data.contains_key("modifyDate"));
        assert!(!data.contains_key("modifyUserId"));
    }

    #[test]
    fn test_modified_by_keeps_supplied_values() {
        let caller = Caller::new("u1", "jeff").on_behalf_of(Caller::new("u2", "anna"));
        let mut req = CrudRequest::new()
            .with_caller(caller)
            .with_data(doc! { "modifyUsername": "importer" });
        set_modified_by(&audited(), &mut req).unwrap();

        let data = req.data.unwrap();
        assert_eq!(data.get_str("modifyUserId").unwrap(), "u2");
        assert_eq!(data.get_str("modifyUsername").unwrap(), "importer");
        assert!(data.get_datetime("modifyDate").is_ok());
    }
}
