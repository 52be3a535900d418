//! Implementation for the not-authenticated state.

use std::marker::PhantomData;

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::{Authenticated, NotAuthenticated};
use crate::command::{Command, TagGenerator};
use crate::connection::framed::FramedStream;
use crate::connection::ImapStream;
use crate::connection::sasl::{oauthbearer_response, xoauth2_response};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::ResponseCode;
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new client from a connected stream.
    ///
    /// Reads the server greeting and initial capabilities.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut framed = FramedStream::new(stream);

        // Read server greeting
        let greeting = framed.read_response().await?;
        let response = ResponseParser::parse(&greeting)?;

        // The greeting must start with "* OK" or "* PREAUTH" (spec.md §4.1);
        // anything else — BYE, a tagged response, BAD/NO — is a BadGreeting.
        let Response::Untagged(untagged) = response else {
            return Err(Error::BadGreeting(format!("{response:?}")));
        };

        let mut capabilities = Vec::new();
        match untagged {
            UntaggedResponse::Ok {
                code: Some(ResponseCode::Capability(caps)),
                ..
            }
            | UntaggedResponse::PreAuth {
                code: Some(ResponseCode::Capability(caps)),
                ..
            } => {
                capabilities = caps;
            }
            UntaggedResponse::Ok { .. } | UntaggedResponse::PreAuth { .. } => {}
            UntaggedResponse::Bye { text, .. } => {
                return Err(Error::Bye(text));
            }
            other => {
                return Err(Error::BadGreeting(format!("{other:?}")));
            }
        }

        Ok(Self {
            stream: framed,
            tag_gen: TagGenerator::default(),
            capabilities,
            command_timeout: super::DEFAULT_COMMAND_TIMEOUT,
            _state: PhantomData,
        })
    }

    /// Authenticates with the server using LOGIN.
    ///
    /// Consumes self and returns an authenticated client on success.
    pub async fn login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        let tag = self.tag_gen.next();
        let cmd = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        }
        .serialize(&tag);

        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;

        // Update capabilities if included in response
        for response_bytes in &responses {
            if let Ok(Response::Untagged(UntaggedResponse::Capability(caps))) =
                ResponseParser::parse(response_bytes)
            {
                self.capabilities = caps;
            }
        }

        Self::check_tagged_ok(&responses, &tag)?;

        Ok(Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            capabilities: self.capabilities,
            command_timeout: self.command_timeout,
            _state: PhantomData,
        })
    }

    /// Authenticates with the server using `OAuth2` XOAUTH2 mechanism.
    ///
    /// Consumes self and returns an authenticated client on success.
    /// Uses the XOAUTH2 SASL mechanism (Google/Microsoft proprietary).
    ///
    /// `access_token` is an already-resolved bearer token; acquiring and
    /// refreshing it is outside this crate's concern.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails or if the server doesn't support XOAUTH2.
    pub async fn authenticate_xoauth2(
        mut self,
        email: &str,
        access_token: &str,
    ) -> Result<Client<S, Authenticated>> {
        let auth_string = xoauth2_response(email, access_token);
        let tag = self.tag_gen.next();
        let cmd = Command::Authenticate {
            mechanism: "XOAUTH2".to_string(),
            initial_response: Some(auth_string),
        }
        .serialize(&tag);

        self.stream.write_command(&cmd).await?;
        let responses = self.read_until_tagged(&tag).await?;

        // Update capabilities if included in response
        for response_bytes in &responses {
            if let Ok(Response::Untagged(UntaggedResponse::Capability(caps))) =
                ResponseParser::parse(response_bytes)
            {
                self.capabilities = caps;
            }
        }

        Self::check_tagged_ok(&responses, &tag)?;

        Ok(Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            capabilities: self.capabilities,
            command_timeout: self.command_timeout,
            _state: PhantomData,
        })
    }

    /// Authenticates with the server using `OAuth2` OAUTHBEARER mechanism.
    ///
    /// Consumes self and returns an authenticated client on success.
    /// Uses the OAUTHBEARER SASL mechanism (RFC 7628 standard).
    ///
    /// `access_token` is an already-resolved bearer token; acquiring and
    /// refreshing it is outside this crate's concern.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails or if the server doesn't support OAUTHBEARER.
    pub async fn authenticate_oauthbearer(
        mut self,
        email: &str,
        access_token: &str,
    ) -> Result<Client<S, Authenticated>> {
        let auth_string = oauthbearer_response(email, access_token);
        let tag = self.tag_gen.next();
        let cmd = Command::Authenticate {
            mechanism: "OAUTHBEARER".to_string(),
            initial_response: Some(auth_string),
        }
        .serialize(&tag);

        self.stream.write_command(&cmd).await?;
        let responses = self.read_until_tagged(&tag).await?;

        // Update capabilities if included in response
        for response_bytes in &responses {
            if let Ok(Response::Untagged(UntaggedResponse::Capability(caps))) =
                ResponseParser::parse(response_bytes)
            {
                self.capabilities = caps;
            }
        }

        Self::check_tagged_ok(&responses, &tag)?;

        Ok(Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            capabilities: self.capabilities,
            command_timeout: self.command_timeout,
            _state: PhantomData,
        })
    }

    /// Gracefully disconnects from the server.
    pub async fn logout(mut self) -> Result<()> {
        let tag = self.tag_gen.next();
        let cmd = Command::Logout.serialize(&tag);
        self.stream.write_command(&cmd).await?;

        // Read until we get the tagged response or BYE
        let _ = self.read_until_tagged(&tag).await;

        Ok(())
    }
}

impl Client<ImapStream, NotAuthenticated> {
    /// Upgrades a plaintext connection to TLS via STARTTLS.
    ///
    /// `sni_host` is the hostname presented during the TLS handshake;
    /// it must match the certificate the server presents, which is not
    /// always the same string used to dial the TCP connection (callers
    /// that route through a proxy may need to pass an SNI override).
    ///
    /// Capabilities must be re-queried after STARTTLS per RFC 3501 §6.2.1:
    /// a server is not required to re-advertise capabilities in the
    /// STARTTLS response, and any pre-TLS capabilities (notably any
    /// `AUTH=` mechanisms) must be discarded since they were observed
    /// over an unauthenticated channel.
    pub async fn starttls(mut self, sni_host: &str) -> Result<Self> {
        let tag = self.tag_gen.next();
        let cmd = Command::StartTls.serialize(&tag);
        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;

        let plain = self.stream.into_inner();
        let upgraded = plain.upgrade_to_tls(sni_host).await?;
        self.stream = FramedStream::new(upgraded);

        self.capabilities.clear();
        let _ = self.capability().await?;

        Ok(self)
    }
}
