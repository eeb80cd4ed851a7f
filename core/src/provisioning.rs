//! Account, application, address, payment, invitation and feature
//! management on top of `ResourceClient`.
//!
//! Every operation supplies a resource path and parameters to the adapter
//! and lightly reshapes what comes back, usually by deriving an identifier
//! from the last segment of an `href`. Required fields are checked before
//! any request is sent and may be given in snake_case or camelCase.

use serde_json::Value;

use crate::client::ResourceClient;
use crate::config::ClientConfig;
use crate::error::{ProvisioningError, Result};
use crate::keys::{camelize_key, camelize_keys, last_path_segment};
use crate::transport::{Transport, UreqTransport};
use crate::types::{Decoded, Params, Resource};

pub const DEFAULT_PARTITION: &str = "staging";
pub const DEFAULT_PLATFORM: &str = "scripting";
pub const VALID_PLATFORMS: &[&str] = &["scripting", "webapi"];
pub const VALID_PARTITIONS: &[&str] = &["staging", "production"];

/// Branding applied to new users that do not name a website.
const DEFAULT_WEBSITE: &str = "tropo";
const SMS_WHITELIST: &str = "partitions/production/platforms/sms/whitelist";

/// Keys an address may be looked up by.
const ADDRESS_KEYS: &[&str] = &["number", "username", "pin", "token"];

#[derive(Debug)]
pub struct Provisioning<T: Transport = UreqTransport> {
    client: ResourceClient<T>,
    user_data: Option<Resource>,
}

impl Provisioning<UreqTransport> {
    /// Build a client from `config` and load the authenticated user's record.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        Self::connect_with(ResourceClient::new(config))
    }
}

impl<T: Transport> Provisioning<T> {
    /// Wrap `client` without contacting the API.
    pub fn new(client: ResourceClient<T>) -> Self {
        Self {
            client,
            user_data: None,
        }
    }

    pub fn connect_with(client: ResourceClient<T>) -> Result<Self> {
        let mut provisioning = Self::new(client);
        let username = provisioning.username().to_string();
        provisioning.user(&username)?;
        Ok(provisioning)
    }

    pub fn client(&self) -> &ResourceClient<T> {
        &self.client
    }

    /// The username used for HTTP authentication.
    pub fn username(&self) -> &str {
        self.client.config().username()
    }

    /// The record of the authenticated user, once `user` has fetched it.
    pub fn user_data(&self) -> Option<&Resource> {
        self.user_data.as_ref()
    }

    // ---------------------------------------------------------------------
    // Users
    // ---------------------------------------------------------------------

    /// Fetch a user by id or username.
    ///
    /// When the record belongs to the authenticated user it is also kept as
    /// `user_data`.
    pub fn user(&mut self, user_identifier: &str) -> Result<Resource> {
        let result = self
            .client
            .get(&format!("users/{user_identifier}"), &[])?
            .into_object()?;
        let is_self = result
            .get("username")
            .and_then(Value::as_str)
            .is_some_and(|name| name.eq_ignore_ascii_case(self.username()));
        if is_self {
            self.user_data = Some(result.clone());
        }
        Ok(result)
    }

    /// Create a user in the pending state.
    ///
    /// The result carries `href`, `user_id` and `confirmation_key`, the last
    /// two being what `confirm_user` needs.
    pub fn create_user(&self, params: &Params) -> Result<Resource> {
        require(
            params,
            &["username", "password", "first_name", "last_name", "email"],
        )?;
        let mut body = params.clone();
        if field(&body, "website").is_none() {
            body.insert("website".to_string(), Value::from(DEFAULT_WEBSITE));
        }

        let mut result = self.client.post("users", &body)?.into_object()?;
        let user_id = last_path_segment(href(&result)?).to_string();
        result.insert("user_id".to_string(), Value::from(user_id));
        if let Some(key) = result.remove("confirmationKey") {
            result.insert("confirmation_key".to_string(), key);
        }
        Ok(result)
    }

    pub fn confirm_user(
        &self,
        user_id: &str,
        confirmation_key: &str,
        ip_address: &str,
    ) -> Result<Resource> {
        let mut body = Params::new();
        body.insert("key".to_string(), Value::from(confirmation_key));
        body.insert("endUserHost".to_string(), Value::from(ip_address));
        self.client
            .post(&format!("users/{user_id}/confirmations"), &body)?
            .into_object()
    }

    /// Update a user. Changes to the authenticated user are mirrored into
    /// `user_data`.
    pub fn modify_user(&mut self, user_id: &str, params: &Params) -> Result<Resource> {
        let result = self
            .client
            .put(&format!("users/{user_id}"), params)?
            .into_object()?;
        if result.contains_key("href") {
            if let Some(data) = self.user_data.as_mut() {
                if value_matches(data.get("id"), user_id) {
                    data.extend(camelize_keys(params.clone()));
                }
            }
        }
        Ok(result)
    }

    /// Search users by field, e.g. `[("city", "Orlando")]`.
    pub fn search_users(&self, query: &[(&str, &str)]) -> Result<Vec<Resource>> {
        self.client.get("users/", query)?.into_list()
    }

    /// Search users with a preformatted `key=value` term.
    pub fn search_users_by_term(&self, term: &str) -> Result<Vec<Resource>> {
        self.client.get(&format!("users/?{term}"), &[])?.into_list()
    }

    pub fn username_exists(&self, username: &str) -> Result<Decoded> {
        self.client.get(&format!("usernames/{username}"), &[])
    }

    // ---------------------------------------------------------------------
    // Payments
    // ---------------------------------------------------------------------

    /// The user's payment method, with `id` taken from its `paymentType`.
    pub fn user_payment_method(&self, user_id: &str) -> Result<Resource> {
        let mut result = self
            .client
            .get(&format!("users/{user_id}/payment/method"), &[])?
            .into_object()?;
        let payment_type = result
            .get("paymentType")
            .and_then(Value::as_str)
            .map(|href| last_path_segment(href).to_string());
        if let Some(id) = payment_type {
            result.insert("id".to_string(), Value::from(id));
        }
        Ok(result)
    }

    pub fn available_payment_types(&self) -> Result<Vec<Resource>> {
        self.client.get("types/payment", &[])?.into_list()
    }

    pub fn balance(&self, user_id: &str) -> Result<Resource> {
        self.client
            .get(&format!("users/{user_id}/usage"), &[])?
            .into_object()
    }

    pub fn add_payment_info(&self, user_id: &str, params: &Params) -> Result<Resource> {
        self.client
            .put(&format!("users/{user_id}/payment/method"), params)?
            .into_object()
    }

    pub fn modify_payment_info(&self, user_id: &str, params: &Params) -> Result<Resource> {
        self.add_payment_info(user_id, params)
    }

    pub fn update_recurrence(&self, user_id: &str, params: &Params) -> Result<Resource> {
        require(params, &["recharge_amount", "threshold_percentage"])?;
        self.client
            .put(&format!("users/{user_id}/payment/recurrence"), params)?
            .into_object()
    }

    pub fn get_recurrence(&self, user_id: &str) -> Result<Resource> {
        self.client
            .get(&format!("users/{user_id}/payment/recurrence"), &[])?
            .into_object()
    }

    /// Charge `amount` US dollars to the user's payment method.
    pub fn make_payment(&self, user_id: &str, amount: f64) -> Result<Resource> {
        if !amount.is_finite() {
            return Err(ProvisioningError::invalid_argument(
                "amount must be a finite number",
            ));
        }
        let mut body = Params::new();
        body.insert("amount".to_string(), Value::from(amount));
        self.client
            .post(&format!("users/{user_id}/payments"), &body)?
            .into_object()
    }

    // ---------------------------------------------------------------------
    // Geography and catalogue
    // ---------------------------------------------------------------------

    pub fn countries(&self) -> Result<Vec<Resource>> {
        let countries = self.client.get("countries", &[])?.into_list()?;
        Ok(add_ids(countries))
    }

    pub fn states(&self, country_id: &str) -> Result<Vec<Resource>> {
        let states = self
            .client
            .get(&format!("countries/{country_id}/states"), &[])?
            .into_list()?;
        Ok(add_ids(states))
    }

    /// Exchanges numbers can be obtained from.
    pub fn exchanges(&self) -> Result<Vec<Resource>> {
        self.client.get("exchanges", &[])?.into_list()
    }

    pub fn partitions(&self) -> Result<Vec<Resource>> {
        self.client.get("partitions", &[])?.into_list()
    }

    pub fn platforms(&self, partition: &str) -> Result<Vec<Resource>> {
        self.client
            .get(&format!("partitions/{partition}/platforms"), &[])?
            .into_list()
    }

    // ---------------------------------------------------------------------
    // Features
    // ---------------------------------------------------------------------

    pub fn features(&self) -> Result<Vec<Resource>> {
        self.client.get("features", &[])?.into_list()
    }

    pub fn user_features(&self, user_id: &str) -> Result<Vec<Resource>> {
        self.client
            .get(&format!("users/{user_id}/features"), &[])?
            .into_list()
    }

    pub fn user_enable_feature(&self, user_id: &str, feature: &str) -> Result<Resource> {
        let mut body = Params::new();
        body.insert("feature".to_string(), Value::from(feature));
        self.client
            .post(&format!("users/{user_id}/features"), &body)?
            .into_object()
    }

    pub fn user_disable_feature(&self, user_id: &str, feature_number: &str) -> Result<Decoded> {
        self.client
            .delete(&format!("users/{user_id}/features/{feature_number}"), &[])
    }

    // ---------------------------------------------------------------------
    // Applications
    // ---------------------------------------------------------------------

    /// Fetch one application, adding `application_id`.
    pub fn application(&self, application_id: &str) -> Result<Resource> {
        let app = self
            .client
            .get(&format!("applications/{application_id}"), &[])?
            .into_first_object()?;
        with_application_id(app)
    }

    pub fn applications(&self) -> Result<Vec<Resource>> {
        self.client
            .get("applications", &[])?
            .into_list()?
            .into_iter()
            .map(with_application_id)
            .collect()
    }

    /// `application` plus its configured addresses under `addresses`.
    pub fn application_with_addresses(&self, application_id: &str) -> Result<Resource> {
        let app = self.application(application_id)?;
        self.attach_addresses(app)
    }

    pub fn applications_with_addresses(&self) -> Result<Vec<Resource>> {
        self.applications()?
            .into_iter()
            .map(|app| self.attach_addresses(app))
            .collect()
    }

    /// Create an application.
    ///
    /// `partition` defaults to `staging` and `platform` to `scripting`.
    pub fn create_application(&self, params: &Params) -> Result<Resource> {
        let mut body = Params::new();
        body.insert("partition".to_string(), Value::from(DEFAULT_PARTITION));
        body.insert("platform".to_string(), Value::from(DEFAULT_PLATFORM));
        body.extend(params.clone());
        validate_application(&body)?;

        let result = self.client.post("applications", &body)?.into_object()?;
        with_application_id(result)
    }

    pub fn update_application(&self, application_id: &str, params: &Params) -> Result<Resource> {
        self.client
            .put(&format!("applications/{application_id}"), params)?
            .into_object()
    }

    pub fn delete_application(&self, application_id: &str) -> Result<Decoded> {
        self.client
            .delete(&format!("applications/{application_id}"), &[])
    }

    fn attach_addresses(&self, mut app: Resource) -> Result<Resource> {
        let application_id = app
            .get("application_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let addresses = self.addresses(&application_id)?;
        app.insert(
            "addresses".to_string(),
            Value::Array(addresses.into_iter().map(Value::Object).collect()),
        );
        Ok(app)
    }

    // ---------------------------------------------------------------------
    // Addresses
    // ---------------------------------------------------------------------

    pub fn addresses(&self, application_id: &str) -> Result<Vec<Resource>> {
        self.client
            .get(&format!("applications/{application_id}/addresses"), &[])?
            .into_list()
    }

    /// The address of `application_id` whose number, username, pin or
    /// token equals `address_id`.
    pub fn address(&self, application_id: &str, address_id: &str) -> Result<Resource> {
        self.addresses(application_id)?
            .into_iter()
            .find(|address| {
                ADDRESS_KEYS
                    .iter()
                    .any(|key| value_matches(address.get(*key), address_id))
            })
            .ok_or_else(|| ProvisioningError::AddressNotFound {
                application_id: application_id.to_string(),
                address: address_id.to_string(),
            })
    }

    /// Add an address to an application. The result gains `address`, the
    /// last segment of the new address's href.
    pub fn create_address(&self, application_id: &str, params: &Params) -> Result<Resource> {
        validate_address(params)?;
        let mut result = self
            .client
            .post(&format!("applications/{application_id}/addresses"), params)?
            .into_object()?;
        let address = last_path_segment(href(&result)?).to_string();
        result.insert("address".to_string(), Value::from(address));
        Ok(result)
    }

    pub fn delete_address(&self, application_id: &str, address_id: &str) -> Result<Decoded> {
        let address = self.address(application_id, address_id)?;
        let kind = address_type(&address)?;
        self.client.delete(
            &format!("applications/{application_id}/addresses/{kind}/{address_id}"),
            &[],
        )
    }

    /// Move an address from one application to another.
    ///
    /// Any failing step is reported as `MoveAddress` with the underlying
    /// error as its source.
    pub fn move_address(&self, from: &str, to: &str, address: &str) -> Result<Decoded> {
        for (name, value) in [("from", from), ("to", to), ("address", address)] {
            if value.is_empty() {
                return Err(ProvisioningError::invalid_argument(format!(
                    ":{name} is a required parameter"
                )));
            }
        }
        self.relocate_address(from, to, address)
            .map_err(|source| ProvisioningError::MoveAddress {
                address: address.to_string(),
                source: Box::new(source),
            })
    }

    fn relocate_address(&self, from: &str, to: &str, address: &str) -> Result<Decoded> {
        let existing = self.address(from, address)?;
        let kind = address_type(&existing)?;
        self.client.delete(
            &format!("applications/{from}/addresses/{kind}/{address}"),
            &[],
        )?;
        self.client.post(
            &format!("applications/{to}/addresses/{kind}/{address}"),
            &Params::new(),
        )
    }

    // ---------------------------------------------------------------------
    // Invitations
    // ---------------------------------------------------------------------

    pub fn invitations(&self) -> Result<Vec<Resource>> {
        self.client.get("invitations", &[])?.into_list()
    }

    pub fn user_invitations(&self, user_id: &str) -> Result<Vec<Resource>> {
        self.client
            .get(&format!("users/{user_id}/invitations"), &[])?
            .into_list()
    }

    pub fn invitation(&self, invitation_id: &str) -> Result<Resource> {
        self.client
            .get(&format!("invitations/{invitation_id}"), &[])?
            .into_object()
    }

    pub fn user_invitation(&self, user_id: &str, invitation_id: &str) -> Result<Resource> {
        self.client
            .get(&format!("users/{user_id}/invitations/{invitation_id}"), &[])?
            .into_object()
    }

    /// Create a global invitation code. Accepts `code`, `count`, `credit`,
    /// `partition` and `owner`; the API generates a code when none is given.
    pub fn create_invitation(&self, params: &Params) -> Result<Resource> {
        self.client.post("invitations", params)?.into_object()
    }

    pub fn create_user_invitation(&self, user_id: &str, params: &Params) -> Result<Resource> {
        self.client
            .post(&format!("users/{user_id}/invitations"), params)?
            .into_object()
    }

    pub fn update_invitation(&self, invitation_id: &str, params: &Params) -> Result<Resource> {
        self.client
            .put(&format!("invitations/{invitation_id}"), params)?
            .into_object()
    }

    pub fn update_user_invitation(
        &self,
        user_id: &str,
        invitation_id: &str,
        params: &Params,
    ) -> Result<Resource> {
        self.client
            .put(
                &format!("users/{user_id}/invitations/{invitation_id}"),
                params,
            )?
            .into_object()
    }

    pub fn delete_invitation(&self, invitation_id: &str) -> Result<Decoded> {
        self.client
            .delete(&format!("invitations/{invitation_id}"), &[])
    }

    pub fn delete_user_invitation(&self, user_id: &str, invitation_id: &str) -> Result<Decoded> {
        self.client
            .delete(&format!("users/{user_id}/invitations/{invitation_id}"), &[])
    }

    // ---------------------------------------------------------------------
    // SMS whitelist
    // ---------------------------------------------------------------------

    /// Numbers on the production SMS whitelist of `user_id`, or of the
    /// authenticated user when `None`.
    pub fn whitelist(&self, user_id: Option<&str>) -> Result<Decoded> {
        self.client.get(&whitelist_path(user_id), &[])
    }

    pub fn add_whitelist(&self, user_id: Option<&str>, value: &str) -> Result<Resource> {
        let mut body = Params::new();
        body.insert("value".to_string(), Value::from(value));
        self.client
            .post(&whitelist_path(user_id), &body)?
            .into_object()
    }

    pub fn delete_whitelist(&self, user_id: Option<&str>, value: &str) -> Result<Decoded> {
        self.client
            .delete(&format!("{}/{value}", whitelist_path(user_id)), &[])
    }
}

fn whitelist_path(user_id: Option<&str>) -> String {
    match user_id {
        Some(id) => format!("users/{id}/{SMS_WHITELIST}"),
        None => format!("users/{SMS_WHITELIST}"),
    }
}

/// A parameter under its snake_case or camelCase name, ignoring nulls.
fn field<'a>(params: &'a Params, name: &str) -> Option<&'a Value> {
    params
        .get(name)
        .or_else(|| params.get(&camelize_key(name)))
        .filter(|v| !v.is_null())
}

fn field_str<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    field(params, name).and_then(Value::as_str)
}

fn require(params: &Params, names: &[&str]) -> Result<()> {
    match names.iter().find(|name| field(params, name).is_none()) {
        Some(missing) => Err(ProvisioningError::invalid_argument(format!(
            ":{missing} is a required parameter"
        ))),
        None => Ok(()),
    }
}

fn one_of(params: &Params, name: &str, allowed: &[&str]) -> Result<()> {
    match field_str(params, name) {
        Some(value) if allowed.contains(&value) => Ok(()),
        _ => {
            let quoted: Vec<String> = allowed.iter().map(|a| format!("'{a}'")).collect();
            Err(ProvisioningError::invalid_argument(format!(
                ":{name} must be {}",
                quoted.join(" or ")
            )))
        }
    }
}

fn validate_application(params: &Params) -> Result<()> {
    require(params, &["name"])?;
    one_of(params, "platform", VALID_PLATFORMS)?;
    one_of(params, "partition", VALID_PARTITIONS)
}

fn validate_address(params: &Params) -> Result<()> {
    let kind = field_str(params, "type")
        .ok_or_else(|| ProvisioningError::invalid_argument(":type is a required parameter"))?
        .to_ascii_lowercase();

    match kind.as_str() {
        "number" => {
            if field(params, "prefix").is_none() && field(params, "number").is_none() {
                return Err(ProvisioningError::invalid_argument(
                    ":prefix required to add a number address",
                ));
            }
            Ok(())
        }
        "aim" | "msn" | "yahoo" | "gtalk" => require(params, &["username", "password"]),
        "jabber" => require(params, &["username"]),
        "token" => {
            require(params, &["channel"])?;
            match field_str(params, "channel") {
                Some("voice") | Some("messaging") => Ok(()),
                _ => Err(ProvisioningError::invalid_argument(
                    ":channel must be voice or messaging",
                )),
            }
        }
        _ => Ok(()),
    }
}

fn href(resource: &Resource) -> Result<&str> {
    resource
        .get("href")
        .and_then(Value::as_str)
        .ok_or_else(|| ProvisioningError::Decode("response carries no href".to_string()))
}

fn address_type(address: &Resource) -> Result<&str> {
    address
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ProvisioningError::Decode("address carries no type".to_string()))
}

fn with_application_id(mut app: Resource) -> Result<Resource> {
    let id = last_path_segment(href(&app)?).to_string();
    app.insert("application_id".to_string(), Value::from(id));
    Ok(app)
}

/// Fill in `id` from the href for entries the API lists without one.
fn add_ids(mut items: Vec<Resource>) -> Vec<Resource> {
    for item in &mut items {
        if item.get("id").is_some_and(|id| !id.is_null()) {
            continue;
        }
        let id = item
            .get("href")
            .and_then(Value::as_str)
            .map(|href| last_path_segment(href).to_string());
        if let Some(id) = id {
            item.insert("id".to_string(), Value::from(id));
        }
    }
    items
}

/// Ids arrive as strings or numbers depending on the endpoint.
fn value_matches(value: Option<&Value>, expected: &str) -> bool {
    match value {
        Some(Value::String(s)) => s == expected,
        Some(Value::Number(n)) => n.to_string() == expected,
        _ => false,
    }
}
