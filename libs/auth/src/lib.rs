use headers::authorization::Bearer;
use headers::{Authorization, HeaderMapExt};
use http::{Request, Response, StatusCode};
use std::{collections::HashSet, marker::PhantomData};
use tower_http::validate_request::ValidateRequest;

/// Accepts a request when its bearer token is one of the configured tokens.
/// With no tokens configured every request passes.
pub struct TokenValidate<ResBody> {
    tokens: HashSet<String>,
    _ty: PhantomData<ResBody>,
}

impl<ResBody> TokenValidate<ResBody> {
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .filter(|t| !t.trim().is_empty())
                .collect(),
            _ty: PhantomData,
        }
    }

    fn allows<B>(&self, request: &Request<B>) -> bool {
        if self.tokens.is_empty() {
            return true;
        }
        request
            .headers()
            .typed_get::<Authorization<Bearer>>()
            .is_some_and(|auth| self.tokens.contains(auth.token()))
    }
}

impl<ResBody> Clone for TokenValidate<ResBody> {
    fn clone(&self) -> Self {
        Self {
            tokens: self.tokens.clone(),
            _ty: PhantomData,
        }
    }
}

impl<B, ResBody: Default> ValidateRequest<B> for TokenValidate<ResBody> {
    type ResponseBody = ResBody;

    fn validate(&mut self, request: &mut Request<B>) -> Result<(), Response<Self::ResponseBody>> {
        if self.allows(request) {
            return Ok(());
        }
        let mut res = Response::new(ResBody::default());
        *res.status_mut() = StatusCode::UNAUTHORIZED;
        Err(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;

    fn request(auth: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().uri("/api/sessions");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_no_tokens_allows_all() {
        let mut validate = TokenValidate::<String>::new(vec![]);
        assert!(validate.validate(&mut request(None)).is_ok());
    }

    #[test]
    fn test_bearer_token() {
        let mut validate = TokenValidate::<String>::new(vec!["live".to_string()]);
        assert!(validate.validate(&mut request(Some("Bearer live"))).is_ok());

        let res = validate
            .validate(&mut request(Some("Bearer relay")))
            .unwrap_err();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        assert!(validate.validate(&mut request(None)).is_err());
        assert!(validate.validate(&mut request(Some("bearer live"))).is_ok());
    }

    #[test]
    fn test_other_schemes_rejected() {
        let mut validate = TokenValidate::<String>::new(vec!["live".to_string()]);
        for auth in ["Basic bGl2ZQ==", "Bearer", "Bear", "x", "", "live"] {
            let res = validate.validate(&mut request(Some(auth))).unwrap_err();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{auth}");
        }
    }
}
