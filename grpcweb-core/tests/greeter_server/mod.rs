use greeter_service::pb::{HelloReply, HelloRequest, Profile};
use greeter_service::{Greeter, GreeterServer};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

pub struct GreeterImpl;

#[tonic::async_trait]
impl Greeter for GreeterImpl {
    async fn say_hello(
        &self,
        request: Request<HelloRequest>,
    ) -> Result<Response<HelloReply>, Status> {
        let name = request.into_inner().name;

        if name.is_empty() {
            return Err(Status::invalid_argument("name must not be empty"));
        }

        Ok(Response::new(HelloReply {
            message: format!("Hello {name}"),
        }))
    }

    async fn echo_profile(&self, request: Request<Profile>) -> Result<Response<Profile>, Status> {
        Ok(Response::new(request.into_inner()))
    }
}

/// Starts a gRPC-Web enabled greeter on a free local port and returns its base URL.
pub async fn spawn() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .accept_http1(true)
            .layer(tonic_web::GrpcWebLayer::new())
            .add_service(GreeterServer::new(GreeterImpl))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    format!("http://{addr}")
}
